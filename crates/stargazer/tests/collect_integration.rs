//! End-to-end collection runs against a scripted transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stargazer::{
    Clock, CollectOptions, CollectProgress, CollectStop, GitHubClient, HttpError, HttpRequest,
    HttpResponse, HttpTransport, ProgressCallback, RequestExecutor, RetryPolicy, SnapshotStore,
    collect_stargazers,
};

const API: &str = "https://api.example";
const NOW: i64 = 1_700_000_000;

#[derive(Clone, Default)]
struct ScriptedTransport {
    routes: Arc<Mutex<HashMap<String, VecDeque<HttpResponse>>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    fn reply(&self, path: &str, status: u16, remaining: u64, body: serde_json::Value) {
        let response = HttpResponse {
            status,
            headers: vec![
                ("x-ratelimit-remaining".to_string(), remaining.to_string()),
                ("x-ratelimit-reset".to_string(), (NOW + 120).to_string()),
            ],
            body: serde_json::to_vec(&body).expect("body"),
        };
        self.routes
            .lock()
            .expect("routes lock")
            .entry(format!("{API}{path}"))
            .or_default()
            .push_back(response);
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.sent.lock().expect("sent lock").push(request.url.clone());
        self.routes
            .lock()
            .expect("routes lock")
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| HttpError::Transport(format!("unscripted {}", request.url)))
    }
}

#[derive(Clone)]
struct RecordingClock {
    state: Arc<Mutex<(DateTime<Utc>, Vec<Duration>)>>,
}

impl RecordingClock {
    fn new() -> Self {
        let start = DateTime::from_timestamp(NOW, 0).expect("epoch");
        Self {
            state: Arc::new(Mutex::new((start, Vec::new()))),
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().expect("clock lock").1.clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().expect("clock lock").0
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().expect("clock lock");
        state.0 += chrono::Duration::from_std(duration).expect("duration");
        state.1.push(duration);
    }
}

fn star(login: &str, starred_at: &str) -> serde_json::Value {
    serde_json::json!({ "starred_at": starred_at, "user": { "login": login } })
}

fn profile(login: &str) -> serde_json::Value {
    serde_json::json!({
        "login": login,
        "name": null,
        "location": "Earth",
        "company": null,
        "email": null,
        "twitter_username": null,
        "followers": 2,
        "bio": null
    })
}

fn client(transport: &ScriptedTransport, clock: &RecordingClock) -> GitHubClient {
    let executor = RequestExecutor::new(Arc::new(transport.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_policy(RetryPolicy::default().with_max_attempts(3));
    GitHubClient::with_executor(executor, "token", API)
}

#[tokio::test]
async fn two_runs_build_an_append_only_history() {
    let transport = ScriptedTransport::default();
    let clock = RecordingClock::new();
    let client = client(&transport, &clock);
    let root = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::for_repo(root.path(), "acme", "widgets");
    let options = CollectOptions::new("acme", "widgets");

    // First run: one stargazer, no prior snapshot.
    transport.reply(
        "/repos/acme/widgets/stargazers?page=1",
        200,
        4000,
        serde_json::json!([star("alice", "2023-01-01T00:00:00Z")]),
    );
    transport.reply("/repos/acme/widgets/stargazers?page=2", 200, 4000, serde_json::json!([]));
    transport.reply("/users/alice", 200, 4000, profile("alice"));

    let first = collect_stargazers(&client, &store, &options, None, None)
        .await
        .expect("first run");
    assert_eq!(first.total, 1);
    assert_eq!(first.stop, CollectStop::Exhausted);
    let first_bytes = std::fs::read(&first.path).expect("first artifact");

    // Second run: alice again at the watermark (skipped), bob after it. The
    // list answers 403 once, and bob's profile leaves the quota low.
    transport.reply("/repos/acme/widgets/stargazers?page=1", 403, 0, serde_json::json!({}));
    transport.reply(
        "/repos/acme/widgets/stargazers?page=1",
        200,
        4000,
        serde_json::json!([
            star("alice", "2023-01-01T00:00:00Z"),
            star("bob", "2023-01-02T00:00:00Z"),
        ]),
    );
    transport.reply("/repos/acme/widgets/stargazers?page=2", 200, 4000, serde_json::json!([]));
    transport.reply("/users/bob", 200, 5, profile("bob"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |event| {
        sink.lock().expect("events lock").push(event);
    });

    let second = collect_stargazers(&client, &store, &options, None, Some(&callback))
        .await
        .expect("second run");

    assert_eq!(second.prior_count, 1);
    assert_eq!(second.new_count, 1);
    assert_eq!(second.total, 2);
    assert_ne!(second.path, first.path);

    // Prior artifact untouched and reproduced as the prefix of the new one.
    assert_eq!(std::fs::read(&first.path).expect("reread"), first_bytes);
    let second_bytes = std::fs::read(&second.path).expect("second artifact");
    assert!(second_bytes.starts_with(&first_bytes));

    let loaded = store.load(&second.path).expect("load");
    let names: Vec<&str> = loaded.rows.iter().map(|r| r.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(loaded.rows[1].location.as_deref(), Some("Earth"));

    // 403: reset is 120s away plus 10s padding; low quota after a profile: 60s.
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(130), Duration::from_secs(60)]
    );

    let profile_requests = transport
        .sent()
        .iter()
        .filter(|url| url.contains("/users/"))
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(
        profile_requests,
        vec![format!("{API}/users/alice"), format!("{API}/users/bob")]
    );

    let events = events.lock().expect("events lock");
    assert!(events.iter().any(|e| matches!(
        e,
        CollectProgress::AlreadyProcessed { username } if username == "alice"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        CollectProgress::RateLimited { status: 403, .. }
    )));
}
