use std::sync::Arc;

use api::{ApiServer, RouterOptions};
use gateway::{
    AdminOverride, CredentialStore, Gateway, InMemoryBroker, Limits, Queue, QueueRegistry,
    UserEntry, digest_password,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    sync::oneshot,
    time::{Duration, sleep},
};

const ADMIN: (&str, &str) = ("admin", "admin-password");
const SENDER: (&str, &str) = ("sender", "sender-password");

struct TestServer {
    base: String,
    broker: Arc<InMemoryBroker>,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(limits: Limits, options: RouterOptions) -> Self {
        let registry = QueueRegistry::new([
            Queue::new("default"),
            Queue::with_schema(
                "orders",
                json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}}),
            )
            .expect("schema"),
        ])
        .expect("registry");
        let broker = Arc::new(InMemoryBroker::new(
            registry.iter().map(|q| q.name().to_string()),
        ));
        let store = CredentialStore::from_entries(
            [UserEntry {
                username: SENDER.0.to_string(),
                password_plain: None,
                password_digest: Some(digest_password(SENDER.1)),
                permissions: vec!["send".to_string()],
            }],
            Some(AdminOverride {
                username: ADMIN.0.to_string(),
                password: ADMIN.1.to_string(),
            }),
        )
        .expect("users");
        let gateway = Gateway::new(store, registry, broker.clone(), limits);
        let prefix = options
            .url_prefix
            .as_deref()
            .and_then(api::normalize_prefix)
            .unwrap_or_default();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = ApiServer::new(gateway, &options);
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve");
        });

        let server = Self {
            base: format!("http://127.0.0.1:{port}{prefix}"),
            broker,
            client: reqwest::Client::new(),
            shutdown: Some(shutdown_tx),
        };
        server.wait_for_health().await;
        server
    }

    async fn wait_for_health(&self) {
        let url = format!("{}/health", self.base);
        for _ in 0..80 {
            if let Ok(resp) = reqwest::get(&url).await
                && resp.status().is_success()
            {
                return;
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!("gateway at {} did not become healthy in time", self.base);
    }

    async fn post(&self, path: &str, auth: (&str, &str), body: String) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .basic_auth(auth.0, Some(auth.1))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("request");
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn send(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.post(path, ADMIN, body.to_string()).await
    }

    async fn receive(&self, count: u32) -> Value {
        let (status, body) = self
            .post("/receive", ADMIN, json!({"count": count}).to_string())
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn messages(batch: &Value) -> Vec<Value> {
    batch["received"]
        .as_array()
        .expect("received array")
        .iter()
        .map(|envelope| envelope["message"].clone())
        .collect()
}

#[tokio::test]
async fn batches_drain_in_order_with_remaining_counts() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;

    let empty = server.receive(1).await;
    assert_eq!(empty, json!({"received": [], "remaining": 0}));

    let (status, body) = server.send("/send", json!([{"n": 1}, {"n": 2}])).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"routed": 2}));
    let (status, body) = server
        .send("/queues/default/send", json!([{"n": 3}, {"n": 4}, {"n": 5}]))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"routed": 3}));

    let first = server.receive(1).await;
    assert_eq!(messages(&first), vec![json!({"n": 1})]);
    assert_eq!(first["remaining"], 4);

    let next = server.receive(3).await;
    assert_eq!(
        messages(&next),
        vec![json!({"n": 2}), json!({"n": 3}), json!({"n": 4})]
    );
    assert_eq!(next["remaining"], 1);

    let last = server.receive(2).await;
    assert_eq!(messages(&last), vec![json!({"n": 5})]);
    assert_eq!(last["remaining"], 0);
}

#[tokio::test]
async fn received_envelope_carries_sender_and_timestamp() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;
    let message = json!({"text": "sending to default endpoint", "nested": {"ok": true}});

    let (status, _) = server
        .post("/send", SENDER, message.to_string())
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let batch = server.receive(1).await;
    let envelope = &batch["received"][0];
    assert_eq!(envelope["message"], message);
    assert_eq!(envelope["sender"], "sender");
    assert_eq!(envelope["queue"], "default");
    assert!(envelope["ts"].is_i64());
}

#[tokio::test]
async fn missing_permission_hides_queue_existence() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;

    for path in ["/queues/default/receive", "/queues/xxx/receive"] {
        let (status, body) = server.post(path, SENDER, String::new()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body, json!({"error": "unauthorized"}));
    }

    let (status, body) = server.post("/queues/xxx/send", SENDER, "{}".to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "queue not found", "description": "queue 'xxx' is not configured"})
    );
}

#[tokio::test]
async fn wrong_password_is_challenged() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;
    let resp = server
        .client
        .get(format!("{}/queues", server.base))
        .basic_auth("admin", Some("not-the-password"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()["www-authenticate"],
        "Basic realm=\"Authentication Required\""
    );
}

#[tokio::test]
async fn invalid_batch_keeps_messages_before_the_failure() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;
    let (status, body) = server
        .send(
            "/queues/orders/send",
            json!([{"id": 1}, {"id": "two"}, {"id": 3}]),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid message");
    assert_eq!(server.broker.depth("orders"), Some(1));
}

#[tokio::test]
async fn oversized_and_empty_bodies_never_reach_broker() {
    let limits = Limits {
        max_content_length: 64,
        ..Limits::default()
    };
    let server = TestServer::start(limits, RouterOptions::default()).await;

    let big = json!({"blob": "x".repeat(128)}).to_string();
    let (status, body) = server.post("/send", ADMIN, big).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["description"], "max content length is 64");

    let (status, body) = server.post("/send", ADMIN, String::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "no data"}));

    let (status, body) = server.post("/send", ADMIN, "[1, 2]".to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["description"], "JSON list must contain only objects");

    assert_eq!(server.broker.publish_calls(), 0);
}

#[tokio::test]
async fn invalid_count_is_rejected_without_fetch() {
    let server = TestServer::start(Limits::default(), RouterOptions::default()).await;
    let (status, body) = server
        .post("/receive", ADMIN, json!({"count": 0}).to_string())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid count");
    assert_eq!(server.broker.fetch_calls(), 0);
}

#[tokio::test]
async fn routes_are_served_under_configured_prefix() {
    let options = RouterOptions {
        url_prefix: Some("/dolesa".to_string()),
    };
    let server = TestServer::start(Limits::default(), options).await;
    assert!(server.base.ends_with("/dolesa"));

    let resp = server
        .client
        .get(format!("{}/queues", server.base))
        .basic_auth(ADMIN.0, Some(ADMIN.1))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let listing: Value = resp.json().await.expect("json");
    assert_eq!(
        listing,
        json!({"queues": ["default", "orders"], "default_queue": "default"})
    );
}
