// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Integration tests for the WebCore WebSocket hub against a mock server.

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use webcore_ws::{
    ConnectionStatus, OperationMask, StaticAuthProvider, StaticUrlProvider, SubscriptionEvent,
    SubscriptionKind, SubscriptionStatus, WebCoreWsConfig, WebCoreWsError, WebCoreWsHub, WsGoal,
};

////////////////////////////////////////////////////////////////////////////////
// Mock server
////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
struct TestServerState {
    connections: AtomicUsize,
    pings: AtomicUsize,
    auth_requests: Mutex<Vec<Value>>,
    subscribe_requests: Mutex<Vec<Value>>,
    unsubscribe_requests: Mutex<Vec<Value>>,
    status_requests: Mutex<Vec<Value>>,
    fail_next_auth: AtomicBool,
    fail_next_subscribe: AtomicBool,
    fail_next_status: AtomicBool,
    swallow_next_unsubscribe: AtomicBool,
    suppress_pong: AtomicBool,
    next_subscription_id: AtomicU64,
    drop_trigger: tokio::sync::Notify,
    push_tx: Mutex<Option<tokio::sync::mpsc::UnboundedSender<String>>>,
}

impl TestServerState {
    fn new() -> Arc<Self> {
        let state = Self::default();
        state.next_subscription_id.store(100, Ordering::SeqCst);
        Arc::new(state)
    }

    /// Pushes a frame to the currently connected client.
    fn push(&self, frame: Value) {
        if let Some(tx) = self.push_tx.lock().unwrap().as_ref() {
            tx.send(frame.to_string()).unwrap();
        }
    }
}

async fn handle_ws_upgrade(
    State(state): State<Arc<TestServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<TestServerState>, mut socket: WebSocket) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (push_tx, mut push_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    *state.push_tx.lock().unwrap() = Some(push_tx);

    loop {
        tokio::select! {
            maybe = socket.recv() => {
                let Some(Ok(msg)) = maybe else { break };
                let Message::Text(text) = msg else { continue };
                let text = text.as_str();

                if text == "?" {
                    state.pings.fetch_add(1, Ordering::SeqCst);
                    if !state.suppress_pong.load(Ordering::SeqCst)
                        && socket.send(Message::Text("!".into())).await.is_err()
                    {
                        break;
                    }
                    continue;
                }

                let frame: Value = serde_json::from_str(text).unwrap();
                let id = frame["id"].as_u64().unwrap();
                let reply = match frame["goal"].as_str().unwrap() {
                    "auth" => {
                        state.auth_requests.lock().unwrap().push(frame.clone());
                        if state.fail_next_auth.swap(false, Ordering::SeqCst) {
                            json!({
                                "id": id,
                                "goal": "auth",
                                "resultCode": 401,
                                "resultCodeMessage": "invalid key"
                            })
                        } else {
                            json!({"id": id, "goal": "auth", "resultCode": 0})
                        }
                    }
                    "subscribe" => {
                        state.subscribe_requests.lock().unwrap().push(frame.clone());
                        if state.fail_next_subscribe.swap(false, Ordering::SeqCst) {
                            json!({
                                "id": id,
                                "goal": "subscribe",
                                "resultCode": 400,
                                "resultCodeMessage": "bad subscription"
                            })
                        } else {
                            let sid = state.next_subscription_id.fetch_add(1, Ordering::SeqCst);
                            json!({
                                "id": id,
                                "goal": "subscribe",
                                "resultCode": 0,
                                "subscriptionId": sid
                            })
                        }
                    }
                    "unsubscribe" => {
                        state.unsubscribe_requests.lock().unwrap().push(frame.clone());
                        if state.swallow_next_unsubscribe.swap(false, Ordering::SeqCst) {
                            continue;
                        }
                        json!({"id": id, "goal": "unsubscribe", "resultCode": 0})
                    }
                    "status" => {
                        state.status_requests.lock().unwrap().push(frame.clone());
                        if state.fail_next_status.swap(false, Ordering::SeqCst) {
                            json!({
                                "id": id,
                                "goal": "status",
                                "resultCode": 500,
                                "resultCodeMessage": "internal error"
                            })
                        } else {
                            json!({"id": id, "goal": "status", "resultCode": 0, "state": "ok"})
                        }
                    }
                    other => json!({"id": id, "goal": other, "resultCode": 0}),
                };

                if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            Some(text) = push_rx.recv() => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = state.drop_trigger.notified() => {
                // Drop without a close handshake to simulate a dead peer
                break;
            }
        }
    }
}

async fn start_ws_server(state: Arc<TestServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(handle_ws_upgrade))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

////////////////////////////////////////////////////////////////////////////////
// Helpers
////////////////////////////////////////////////////////////////////////////////

async fn wait_until_async<F, Fut>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn test_config() -> WebCoreWsConfig {
    WebCoreWsConfig {
        reconnect_delays_ms: vec![0, 100, 100, 100],
        ping_interval_ms: 200,
        pong_timeout_ms: 60_000,
        idle_timeout_ms: 60_000,
        request_timeout_ms: 5_000,
        connect_timeout_ms: 2_000,
    }
}

fn make_hub(
    addr: SocketAddr,
    config: WebCoreWsConfig,
    key: Option<&str>,
) -> (WebCoreWsHub, Arc<StaticAuthProvider>) {
    let auth_provider = Arc::new(StaticAuthProvider::new(key.map(String::from)));
    let hub = WebCoreWsHub::new(
        config,
        Arc::new(StaticUrlProvider::new(format!("ws://{addr}/ws"))),
        auth_provider.clone(),
    );
    (hub, auth_provider)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_connect_and_authenticate() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    hub.connect().await.unwrap();
    assert!(hub.is_active());

    hub.ensure_authenticated().await.unwrap();
    assert_eq!(
        hub.connection_status(),
        ConnectionStatus::OpenAndAuthenticated
    );

    let auth_requests = state.auth_requests.lock().unwrap().clone();
    assert_eq!(auth_requests.len(), 1);
    assert_eq!(auth_requests[0]["key"], json!("secret"));
    assert_eq!(auth_requests[0]["goal"], json!("auth"));

    hub.close().await;
}

#[tokio::test]
async fn test_connect_without_credentials_stays_open() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, _) = make_hub(addr, test_config(), None);

    hub.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(hub.connection_status(), ConnectionStatus::Open);
    assert!(state.auth_requests.lock().unwrap().is_empty());

    hub.close().await;
}

#[tokio::test]
async fn test_auth_failure_keeps_waiters_until_next_gate_run() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    state.fail_next_auth.store(true, Ordering::SeqCst);
    let (hub, auth_provider) = make_hub(addr, test_config(), Some("bad-key"));
    let hub = Arc::new(hub);

    let pending = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.ensure_authenticated().await })
    };

    // The rejection leaves the session Open and the waiter unresolved
    wait_until_async(
        || async { state.auth_requests.lock().unwrap().len() == 1 },
        Duration::from_secs(5),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.connection_status(), ConnectionStatus::Open);
    assert!(!pending.is_finished());

    // A later gate run with fresh credentials resolves the waiter
    auth_provider.set_key(Some("good-key".to_string()));
    hub.notify_login();

    pending.await.unwrap().unwrap();
    assert!(hub.is_authenticated());
    assert_eq!(state.auth_requests.lock().unwrap().len(), 2);

    hub.close().await;
}

#[tokio::test]
async fn test_request_queued_before_connect_flushes_after_auth() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    // No explicit connect: the queued request must trigger the session itself
    let response = hub.request(WsGoal::Status, json!({})).await.unwrap();
    assert_eq!(response["resultCode"], json!(0));
    assert_eq!(response["state"], json!("ok"));

    // Auth completed before the gated packet was delivered
    assert_eq!(state.auth_requests.lock().unwrap().len(), 1);
    assert_eq!(state.status_requests.lock().unwrap().len(), 1);

    hub.close().await;
}

#[tokio::test]
async fn test_request_rejected_by_server() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    state.fail_next_status.store(true, Ordering::SeqCst);
    let (hub, _) = make_hub(addr, test_config(), None);

    let result = hub.request_no_auth(WsGoal::Status, json!({})).await;
    match result {
        Err(WebCoreWsError::ServerError { code, message }) => {
            assert_eq!(code, 500);
            assert_eq!(message, "internal error");
        }
        other => panic!("unexpected: {other:?}"),
    }

    hub.close().await;
}

#[tokio::test]
async fn test_subscribe_activates_and_receives_pushes() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    let subscription = hub
        .subscribe(
            SubscriptionKind::LocationStates,
            OperationMask::ALL,
            json!({"locationId": 5, "name": "x"}),
        )
        .unwrap();

    wait_until_async(
        || async { subscription.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;

    let sid = subscription.subscription_id().unwrap();
    assert_eq!(hub.active_subscription_count(), 1);

    let subscribe_requests = state.subscribe_requests.lock().unwrap().clone();
    assert_eq!(subscribe_requests.len(), 1);
    let request_id = subscribe_requests[0]["id"].as_u64().unwrap();
    assert_eq!(
        subscribe_requests[0]["subscription"],
        json!({
            "type": "LOCATION_STATES",
            "operation": 7,
            "locationId": 5,
            "name": "x"
        })
    );

    let mut events = subscription.events();
    let stream = subscription.stream();
    tokio::pin!(stream);

    state.push(json!({
        "id": request_id,
        "goal": "data",
        "subscriptionId": sid,
        "data": {"operation": "update", "locationId": 5, "name": "x"}
    }));

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SubscriptionEvent::Update(payload) => {
            assert_eq!(payload["locationId"], json!(5));
            assert_eq!(payload["name"], json!("x"));
        }
        other => panic!("unexpected: {other:?}"),
    }

    // The stream surface observes the same fan-out
    let streamed = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(streamed, SubscriptionEvent::Update(_)));

    hub.close().await;
}

#[tokio::test]
async fn test_subscribe_rejection_emits_error_event() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    state.fail_next_subscribe.store(true, Ordering::SeqCst);
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    let subscription = hub
        .subscribe(SubscriptionKind::Devices, OperationMask::ALL, json!({}))
        .unwrap();
    let mut events = subscription.events();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SubscriptionEvent::Error { code, message } => {
            assert_eq!(code, 400);
            assert_eq!(message, "bad subscription");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(subscription.status(), SubscriptionStatus::Inactive);

    hub.close().await;
}

#[tokio::test]
async fn test_subscription_resubscribes_after_reconnect() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let mut config = test_config();
    config.reconnect_delays_ms = vec![100, 100, 100, 100];
    let (hub, _) = make_hub(addr, config, Some("secret"));

    let subscription = hub
        .subscribe(
            SubscriptionKind::LocationStates,
            OperationMask::ALL,
            json!({"locationId": 5, "name": "x"}),
        )
        .unwrap();

    wait_until_async(
        || async { subscription.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;
    let first_sid = subscription.subscription_id().unwrap();

    // Kill the connection without a close handshake
    state.drop_trigger.notify_one();

    wait_until_async(
        || async {
            subscription.status() == SubscriptionStatus::Inactive
                && subscription.subscription_id().is_none()
        },
        Duration::from_secs(5),
    )
    .await;

    // The hub reconnects, re-authenticates, and replays the subscription
    wait_until_async(
        || async { subscription.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;

    assert!(state.connections.load(Ordering::SeqCst) >= 2);
    assert_eq!(state.auth_requests.lock().unwrap().len(), 2);

    let subscribe_requests = state.subscribe_requests.lock().unwrap().clone();
    assert_eq!(subscribe_requests.len(), 2);
    assert_ne!(subscribe_requests[0]["id"], subscribe_requests[1]["id"]);
    assert_ne!(subscription.subscription_id().unwrap(), first_sid);

    hub.close().await;
}

#[tokio::test]
async fn test_unsubscribe_sends_frame_and_cancels_terminally() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    let subscription = hub
        .subscribe(SubscriptionKind::DeviceStates, OperationMask::ALL, json!({}))
        .unwrap();
    wait_until_async(
        || async { subscription.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;
    let sid = subscription.subscription_id().unwrap();

    subscription.unsubscribe();

    wait_until_async(
        || async { state.unsubscribe_requests.lock().unwrap().len() == 1 },
        Duration::from_secs(5),
    )
    .await;
    let unsubscribe_requests = state.unsubscribe_requests.lock().unwrap().clone();
    assert_eq!(unsubscribe_requests[0]["subscriptionId"], json!(sid));
    assert_eq!(subscription.status(), SubscriptionStatus::Cancelled);

    hub.close().await;
}

#[tokio::test]
async fn test_cancelled_subscription_discarded_when_unsubscribe_lost() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    state.swallow_next_unsubscribe.store(true, Ordering::SeqCst);
    let (hub, _) = make_hub(addr, test_config(), Some("secret"));

    let subscription = hub
        .subscribe(SubscriptionKind::Rules, OperationMask::ALL, json!({}))
        .unwrap();
    wait_until_async(
        || async { subscription.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;

    // The unsubscribe frame reaches the server but its response never comes
    subscription.unsubscribe();
    wait_until_async(
        || async { state.unsubscribe_requests.lock().unwrap().len() == 1 },
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(subscription.status(), SubscriptionStatus::Cancelled);

    // The drop discards the in-flight unsubscribe with the session
    state.drop_trigger.notify_one();
    wait_until_async(
        || async { state.auth_requests.lock().unwrap().len() == 2 },
        Duration::from_secs(5),
    )
    .await;

    // The cancelled subscription is not replayed; a new one still activates
    let replacement = hub
        .subscribe(SubscriptionKind::Devices, OperationMask::ALL, json!({}))
        .unwrap();
    wait_until_async(
        || async { replacement.status() == SubscriptionStatus::Active },
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(state.subscribe_requests.lock().unwrap().len(), 2);
    assert_eq!(state.unsubscribe_requests.lock().unwrap().len(), 1);
    assert_eq!(subscription.status(), SubscriptionStatus::Cancelled);
    assert_eq!(hub.active_subscription_count(), 1);

    hub.close().await;
}

#[tokio::test]
async fn test_ping_cadence() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let mut config = test_config();
    config.ping_interval_ms = 100;
    let (hub, _) = make_hub(addr, config, None);

    hub.connect().await.unwrap();

    wait_until_async(
        || async { state.pings.load(Ordering::SeqCst) >= 2 },
        Duration::from_secs(5),
    )
    .await;

    hub.close().await;
}

#[tokio::test]
async fn test_pong_timeout_forces_reconnect() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    state.suppress_pong.store(true, Ordering::SeqCst);
    let mut config = test_config();
    config.ping_interval_ms = 100;
    config.pong_timeout_ms = 400;
    let (hub, _) = make_hub(addr, config, None);

    hub.connect().await.unwrap();

    // Pings go unanswered, so the liveness timer must force a reconnect
    wait_until_async(
        || async { state.connections.load(Ordering::SeqCst) >= 2 },
        Duration::from_secs(5),
    )
    .await;

    hub.close().await;
}

#[tokio::test]
async fn test_idle_timeout_closes_without_reconnect() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let mut config = test_config();
    config.idle_timeout_ms = 300;
    config.ping_interval_ms = 100;
    let (hub, _) = make_hub(addr, config, None);

    hub.connect().await.unwrap();

    // No queue, no subscriptions: the hub shuts the channel down voluntarily
    wait_until_async(
        || async { hub.connection_status() == ConnectionStatus::Disconnected },
        Duration::from_secs(5),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);

    // New work revives the channel
    let response = hub.request_no_auth(WsGoal::Status, json!({})).await.unwrap();
    assert_eq!(response["resultCode"], json!(0));
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);

    hub.close().await;
}

#[tokio::test]
async fn test_wait_until_active_times_out_when_unreachable() {
    let (hub, _) = make_hub(
        "127.0.0.1:9".parse().unwrap(),
        test_config(),
        None,
    );

    let _ = tokio::time::timeout(Duration::from_millis(50), hub.connect()).await;
    let result = hub.wait_until_active(0.3).await;
    assert!(matches!(result, Err(WebCoreWsError::Timeout(_))));

    hub.close().await;
}

#[tokio::test]
async fn test_pending_control_request_rejected_on_close() {
    let (hub, _) = make_hub("127.0.0.1:9".parse().unwrap(), test_config(), None);
    let hub = Arc::new(hub);

    let pending = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.request_no_auth(WsGoal::Status, json!({})).await })
    };

    // Let the request land in the queue against the unreachable endpoint
    tokio::time::sleep(Duration::from_millis(100)).await;
    hub.close().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(WebCoreWsError::ConnectionTerminated)));
}

#[tokio::test]
async fn test_notify_login_authenticates_open_session() {
    let state = TestServerState::new();
    let addr = start_ws_server(state.clone()).await;
    let (hub, auth_provider) = make_hub(addr, test_config(), None);

    hub.connect().await.unwrap();
    assert_eq!(hub.connection_status(), ConnectionStatus::Open);

    auth_provider.set_key(Some("late-key".to_string()));
    hub.notify_login();

    wait_until_async(|| async { hub.is_authenticated() }, Duration::from_secs(5)).await;
    let auth_requests = state.auth_requests.lock().unwrap().clone();
    assert_eq!(auth_requests[0]["key"], json!("late-key"));

    hub.close().await;
}
