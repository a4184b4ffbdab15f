use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;
use twod::adapters::{ChannelOp, DryRunChannel, OpKind, ScriptedSource};
use twod::config::AppConfig;
use twod::domain::{Candidate, ChatId, ExtractedResults, MessageId, Session};
use twod::engine::{EngineConfig, ManualClock, ResultEngine};
use twod::services::format::ACCESS_DENIED;
use twod::services::{router, CommandHandler, Metrics, Publisher, WebhookState};

const ADMIN: i64 = 42;
const STRANGER: i64 = 7;

struct Harness {
    channel: Arc<DryRunChannel>,
    source: Arc<ScriptedSource>,
    engine: Arc<Mutex<ResultEngine>>,
    app: Router,
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 16)
        .unwrap()
        .and_hms_opt(11, 40, 0)
        .unwrap()
}

fn harness(secret: Option<&str>) -> Harness {
    let config = AppConfig::from_toml_str(&format!(
        "[telegram]\nbot_token = \"123:abc\"\nchannel_id = \"@twod_results\"\nadmin_id = {}",
        ADMIN
    ))
    .unwrap();

    let channel = Arc::new(DryRunChannel::new());
    let metrics = Arc::new(Metrics::new());
    let publisher = Publisher::new(
        channel.clone(),
        ChatId::from("@twod_results"),
        config.telegram.live_mode,
    );
    let engine = Arc::new(Mutex::new(ResultEngine::new(
        EngineConfig::from_app(&config).unwrap(),
        publisher,
        metrics.clone(),
    )));
    let source = Arc::new(ScriptedSource::new(ExtractedResults::both(
        Candidate::live("82").with_set("1,312.45"),
    )));
    let handler = Arc::new(
        CommandHandler::new(
            channel.clone(),
            engine.clone(),
            source.clone(),
            Arc::new(ManualClock::new(now())),
            metrics,
            config.telegram.admin_id,
        )
        .with_bot_username(Some("twod_bot".to_string())),
    );

    let state = WebhookState::new(Some(handler), secret.map(str::to_string));
    Harness {
        channel,
        source,
        engine,
        app: router(Arc::new(state)),
    }
}

fn update(from: i64, text: &str) -> String {
    serde_json::json!({
        "update_id": 1000,
        "message": {
            "message_id": 5,
            "from": { "id": from, "is_bot": false, "first_name": "Tester" },
            "chat": { "id": from, "type": "private" },
            "text": text,
        }
    })
    .to_string()
}

fn webhook_post(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn replies_to(channel: &DryRunChannel, chat: i64) -> Vec<String> {
    let chat = ChatId::from(chat);
    channel
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            ChannelOp::Send { chat: to, text, .. } if to == chat => Some(text),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn any_other_request_answers_bot_running() {
    let h = harness(None);

    for (method, uri) in [("GET", "/"), ("GET", "/webhook"), ("HEAD", "/health"), ("POST", "/other")] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{method} {uri}");
        if method != "HEAD" {
            assert_eq!(body_text(response).await, "Bot running");
        }
    }
}

#[tokio::test]
async fn myid_replies_with_sender_id() {
    let h = harness(None);

    let response = h
        .app
        .clone()
        .oneshot(webhook_post(update(STRANGER, "/myid")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let replies = replies_to(&h.channel, STRANGER);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("`7`"));
}

#[tokio::test]
async fn unreadable_update_still_answers_ok() {
    let h = harness(None);

    let response = h
        .app
        .clone()
        .oneshot(webhook_post("{not json".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.channel.ops().is_empty());
}

#[tokio::test]
async fn wrong_secret_token_is_ignored() {
    let h = harness(Some("s3cret"));

    let response = h
        .app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.channel.ops().is_empty());

    let mut request = webhook_post(update(ADMIN, "/status"));
    request.headers_mut().insert(
        "x-telegram-bot-api-secret-token",
        "s3cret".parse().unwrap(),
    );
    h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(replies_to(&h.channel, ADMIN).len(), 1);
}

#[tokio::test]
async fn force_from_non_admin_is_denied_without_side_effects() {
    let h = harness(None);

    h.app
        .clone()
        .oneshot(webhook_post(update(STRANGER, "/forcemorning")))
        .await
        .unwrap();

    assert_eq!(replies_to(&h.channel, STRANGER), vec![ACCESS_DENIED.to_string()]);
    assert_eq!(h.channel.count(OpKind::Pin), 0);
    assert!(!h.engine.lock().await.state(Session::Morning).finalized);
}

#[tokio::test]
async fn force_from_admin_posts_and_pins_final() {
    let h = harness(None);

    h.app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/forceMorning@twod_bot")))
        .await
        .unwrap();

    let finals: Vec<_> = h
        .channel
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            ChannelOp::Send { chat, text, .. } if chat.as_str() == "@twod_results" => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(finals.len(), 1);
    assert!(finals[0].contains("*82* ✅"));
    assert!(matches!(
        h.channel.ops().iter().find(|op| matches!(op, ChannelOp::Pin { .. })),
        Some(ChannelOp::Pin { message: MessageId(1), .. })
    ));

    let replies = replies_to(&h.channel, ADMIN);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("posted and pinned"));
    assert!(h.engine.lock().await.state(Session::Morning).finalized);

    // A second force the same day is refused inline
    h.app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/forcemorning")))
        .await
        .unwrap();
    let replies = replies_to(&h.channel, ADMIN);
    assert!(replies[1].contains("already announced"));
}

#[tokio::test]
async fn force_reports_fetch_failure() {
    let h = harness(None);
    h.source.fail("HTTP 503 from source");

    h.app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/forceevening")))
        .await
        .unwrap();

    let replies = replies_to(&h.channel, ADMIN);
    assert!(replies[0].contains("Could not read the result page"));
    assert_eq!(h.channel.count(OpKind::Pin), 0);
}

#[tokio::test]
async fn force_failure_reason_is_escaped_for_markdown() {
    let h = harness(None);
    h.source
        .fail("HTTP 503 from https://results.example/two_d*live");

    h.app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/forcemorning")))
        .await
        .unwrap();

    let replies = replies_to(&h.channel, ADMIN);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("two\\_d\\*live"), "{}", replies[0]);
}

#[tokio::test]
async fn status_counts_live_posts_per_session() {
    let h = harness(None);
    h.engine
        .lock()
        .await
        .evaluate(
            &ExtractedResults::both(Candidate::live("82").with_set("1,312.45")),
            &now(),
        )
        .await;

    h.app
        .clone()
        .oneshot(webhook_post(update(STRANGER, "/status")))
        .await
        .unwrap();

    let replies = replies_to(&h.channel, STRANGER);
    assert!(replies[0].contains("`82|1,312.45|--` (1 today)"), "{}", replies[0]);
}

#[tokio::test]
async fn commands_for_other_bots_are_ignored() {
    let h = harness(None);

    h.app
        .clone()
        .oneshot(webhook_post(update(ADMIN, "/status@some_other_bot")))
        .await
        .unwrap();

    assert!(h.channel.ops().is_empty());
}

#[tokio::test]
async fn status_history_and_test_replies() {
    let h = harness(None);

    for text in ["/status", "/history", "/test", "/start"] {
        h.app
            .clone()
            .oneshot(webhook_post(update(STRANGER, text)))
            .await
            .unwrap();
    }

    let replies = replies_to(&h.channel, STRANGER);
    assert_eq!(replies.len(), 4);
    assert!(replies[0].contains("`IDLE`"));
    assert!(replies[1].contains("No results recorded yet"));
    assert!(replies[2].contains("Preview only"));
    assert!(replies[2].contains("🔴 *88*"));
    assert!(!replies[3].contains("/forcemorning"));
    // /test never touches the channel
    assert_eq!(h.channel.count(OpKind::Send), 4);
}
