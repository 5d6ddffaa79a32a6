//! Dispatcher integration tests against a scripted upstream.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use clipgen_dispatch::{
    CancellationToken, CredentialRegistry, DispatchConfig, DispatchError, DispatchResult,
    Dispatcher, InMemoryLedger, InMemoryRegistry, UpstreamClient, UpstreamError, UsageLedger,
};
use clipgen_models::{AttemptOutcome, Credential};

const TWO_CLIPS: &str = r#"[
  {"start": "00:05", "end": "00:25", "viralityScore": 9.1, "reason": "Hook", "caption": "Wait for it", "contentType": "funny"},
  {"start": "1:02", "end": "1:40"}
]"#;

const ONE_CLIP: &str = r#"[{"start": "00:10", "end": "00:30"}]"#;

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail(UpstreamError),
    Hang,
}

fn text(body: &str) -> Reply {
    Reply::Text(body.to_string())
}

fn status(code: u16, message: &str) -> Reply {
    Reply::Fail(UpstreamError::http(code, message))
}

fn network(message: &str) -> Reply {
    Reply::Fail(UpstreamError::transport(message))
}

/// Upstream that replays a per-secret script. The last reply repeats.
#[derive(Default)]
struct ScriptedUpstream {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    started: Notify,
}

impl ScriptedUpstream {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, secret: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(secret.to_string(), replies.into());
        self
    }

    fn calls_for(&self, secret: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == secret)
            .map(|(_, at)| *at)
            .collect()
    }

    fn secrets_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    fn next_reply(&self, secret: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(secret) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| network("empty script")),
            None => network("unscripted secret"),
        }
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn generate(&self, secret: &str, _prompt: &str) -> Result<String, UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((secret.to_string(), Instant::now()));
        let reply = self.next_reply(secret);
        self.started.notify_one();
        match reply {
            Reply::Text(body) => Ok(body),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Ledger that always fails.
struct BrokenLedger;

#[async_trait]
impl UsageLedger for BrokenLedger {
    async fn record(&self, _outcome: &AttemptOutcome) -> DispatchResult<()> {
        Err(DispatchError::ledger("disk full"))
    }
}

struct Harness {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<InMemoryRegistry>,
    ledger: Arc<InMemoryLedger>,
    upstream: Arc<ScriptedUpstream>,
}

fn pool(n: usize) -> Vec<Credential> {
    (1..=n)
        .map(|i| Credential::new(format!("k{}", i), format!("s{}", i)))
        .collect()
}

fn harness(credentials: Vec<Credential>, upstream: ScriptedUpstream) -> Harness {
    harness_with_config(DispatchConfig::default(), credentials, upstream)
}

fn harness_with_config(
    config: DispatchConfig,
    credentials: Vec<Credential>,
    upstream: ScriptedUpstream,
) -> Harness {
    let registry = Arc::new(InMemoryRegistry::new(credentials));
    let ledger = Arc::new(InMemoryLedger::new());
    let upstream = Arc::new(upstream);
    let dispatcher = Arc::new(Dispatcher::new(
        config,
        registry.clone(),
        upstream.clone(),
        ledger.clone(),
    ));
    Harness {
        dispatcher,
        registry,
        ledger,
        upstream,
    }
}

async fn registry_ids(registry: &InMemoryRegistry) -> Vec<String> {
    registry
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id.0)
        .collect()
}

/// Quota on the first credential, three network failures on the second,
/// success on the third.
#[tokio::test(start_paused = true)]
async fn test_mixed_failures_then_success() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![status(429, "RESOURCE_EXHAUSTED: Quota exceeded")])
        .script("s2", vec![network("connection reset")])
        .script("s3", vec![text(TWO_CLIPS)]);
    let h = harness(pool(3), upstream);

    let clips = h.dispatcher.generate("find clips", "user-1").await.unwrap();

    assert_eq!(clips.len(), 2);
    assert_eq!(clips[0].start, "00:05");
    assert_eq!(clips[0].virality_score, 9.1);
    assert_eq!(clips[1].start, "01:02");
    assert_eq!(clips[1].caption, "Check out this moment!");

    assert_eq!(h.upstream.calls_for("s1").len(), 1);
    let s2 = h.upstream.calls_for("s2");
    assert_eq!(s2.len(), 3);
    assert_eq!(s2[1] - s2[0], Duration::from_secs(1));
    assert_eq!(s2[2] - s2[1], Duration::from_secs(2));

    let outcomes = h.ledger.outcomes();
    assert_eq!(outcomes.len(), 5);
    let successes: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
    assert_eq!(successes, vec![false, false, false, false, true]);
    assert_eq!(outcomes[4].credential_id.as_str(), "k3");
    assert!(outcomes
        .iter()
        .all(|o| o.user_id == "user-1" && o.request_label == "clip_suggestions"));

    assert!(h.dispatcher.cooldowns().is_cooling_down(&"k1".into()));
    assert_eq!(registry_ids(&h.registry).await, vec!["k1", "k2", "k3"]);
}

#[tokio::test]
async fn test_all_forbidden_evicts_whole_pool() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![status(403, "API key was reported as leaked")])
        .script("s2", vec![status(403, "PERMISSION_DENIED")])
        .script("s3", vec![status(400, "API key not valid. Please pass a valid API key.")]);
    let h = harness(pool(3), upstream);

    let err = h.dispatcher.generate("find clips", "user-1").await.unwrap_err();
    match &err {
        DispatchError::PoolExhausted { last_error: Some(message) } => {
            assert!(message.contains("not valid"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(h.registry.is_empty().await);
    assert_eq!(h.ledger.len(), 3);

    let err = h.dispatcher.generate("find clips", "user-1").await.unwrap_err();
    assert!(matches!(err, DispatchError::PoolExhausted { last_error: None }));
    assert_eq!(h.upstream.secrets_called().len(), 3);
    assert_eq!(h.ledger.len(), 3);
}

#[tokio::test]
async fn test_model_not_found_aborts_without_trying_others() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![status(404, "models/gemini-9 is not found for API version v1beta")])
        .script("s2", vec![text(ONE_CLIP)]);
    let h = harness(pool(2), upstream);

    let err = h.dispatcher.generate("find clips", "user-1").await.unwrap_err();

    assert!(matches!(err, DispatchError::ModelNotFound(_)));
    assert_eq!(h.upstream.secrets_called(), vec!["s1"]);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(registry_ids(&h.registry).await, vec!["k1", "k2"]);
    assert!(h.dispatcher.cooldowns().list_active_cooldowns().is_empty());
}

#[tokio::test]
async fn test_throttle_rejects_eleventh_call() {
    let h = harness(Vec::new(), ScriptedUpstream::new());

    for _ in 0..10 {
        let err = h.dispatcher.generate("p", "busy-user").await.unwrap_err();
        assert!(matches!(err, DispatchError::PoolExhausted { .. }));
    }

    let err = h.dispatcher.generate("p", "busy-user").await.unwrap_err();
    let retry_after = err.retry_after_secs().unwrap();
    assert!((1..=60).contains(&retry_after));

    // Other users are unaffected
    assert!(matches!(
        h.dispatcher.generate("p", "quiet-user").await.unwrap_err(),
        DispatchError::PoolExhausted { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_window_slides() {
    let config = DispatchConfig::default().with_user_limit(2, Duration::from_secs(10));
    let h = harness_with_config(config, Vec::new(), ScriptedUpstream::new());

    h.dispatcher.generate("p", "u").await.unwrap_err();
    tokio::time::advance(Duration::from_secs(4)).await;
    h.dispatcher.generate("p", "u").await.unwrap_err();

    let err = h.dispatcher.generate("p", "u").await.unwrap_err();
    assert_eq!(err.retry_after_secs(), Some(6));

    tokio::time::advance(Duration::from_secs(6)).await;
    let err = h.dispatcher.generate("p", "u").await.unwrap_err();
    assert!(matches!(err, DispatchError::PoolExhausted { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cooled_credential_skipped_until_expiry() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![status(429, "Too Many Requests")])
        .script("s2", vec![text(ONE_CLIP)]);
    let h = harness(pool(2), upstream);

    h.dispatcher.generate("p", "u").await.unwrap();
    h.dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(h.upstream.calls_for("s1").len(), 1);
    assert_eq!(h.upstream.calls_for("s2").len(), 2);

    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    assert!(!h.dispatcher.cooldowns().is_cooling_down(&"k1".into()));

    h.dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(h.upstream.calls_for("s1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_answer_is_retried() {
    let upstream = ScriptedUpstream::new().script(
        "s1",
        vec![text("Sorry, I cannot help with that."), text(ONE_CLIP)],
    );
    let h = harness(pool(1), upstream);

    let clips = h.dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(clips.len(), 1);

    let outcomes = h.ledger.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].success);
    assert!(outcomes[0]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Parse error"));
    assert!(outcomes[1].success);
}

#[tokio::test]
async fn test_empty_answers_are_success() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![text("```json\n[]\n```"), text("NO_TRANSCRIPT")]);
    let h = harness(pool(1), upstream);

    assert!(h.dispatcher.generate("p", "u").await.unwrap().is_empty());
    assert!(h.dispatcher.generate("p", "u").await.unwrap().is_empty());
    assert!(h.ledger.outcomes().iter().all(|o| o.success));
}

#[tokio::test]
async fn test_free_text_answer_recovered() {
    let answer = "Here are the best moments:\n\n\
                  1. **Start:** 0:45\n   **End:** 1:10\n   **Score:** 8/10\n   **Reason:** Big reveal\n   **Type:** dramatic\n\n\
                  2. **Start:** 2:00\n   **End:** 2:30\n";
    let upstream = ScriptedUpstream::new().script("s1", vec![text(answer)]);
    let h = harness(pool(1), upstream);

    let clips = h.dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(clips.len(), 2);
    assert_eq!(clips[0].start, "00:45");
    assert_eq!(clips[0].end, "01:10");
    assert_eq!(clips[0].virality_score, 8.0);
    assert_eq!(clips[0].content_type, "dramatic");
    assert_eq!(clips[1].start, "02:00");
}

#[tokio::test(start_paused = true)]
async fn test_hung_upstream_times_out() {
    let config = DispatchConfig::default()
        .with_max_attempts(1)
        .with_upstream_timeout(Duration::from_secs(5));
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![Reply::Hang])
        .script("s2", vec![text(ONE_CLIP)]);
    let h = harness_with_config(config, pool(2), upstream);

    let clips = h.dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(clips.len(), 1);

    let outcomes = h.ledger.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].success);
    assert!(outcomes[0].latency_ms >= 5000);
    assert!(outcomes[0].error_message.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_cancellation_stops_dispatch() {
    let upstream = ScriptedUpstream::new().script("s1", vec![Reply::Hang]);
    let h = harness(pool(1), upstream);

    let cancel = CancellationToken::new();
    let task = {
        let dispatcher = h.dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.generate_with_cancel("p", "u", &cancel).await })
    };

    h.upstream.started.notified().await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled));
}

#[tokio::test]
async fn test_ledger_failure_does_not_change_result() {
    let registry = Arc::new(InMemoryRegistry::new(pool(1)));
    let upstream = Arc::new(ScriptedUpstream::new().script("s1", vec![text(ONE_CLIP)]));
    let dispatcher = Dispatcher::new(
        DispatchConfig::default(),
        registry,
        upstream,
        Arc::new(BrokenLedger),
    );

    let clips = dispatcher.generate("p", "u").await.unwrap();
    assert_eq!(clips.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_share_pool_state() {
    let upstream = ScriptedUpstream::new()
        .script("s1", vec![status(403, "API key not valid")])
        .script("s2", vec![text(ONE_CLIP)]);
    let h = harness(pool(2), upstream);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let dispatcher = h.dispatcher.clone();
            tokio::spawn(async move { dispatcher.generate("p", &format!("user-{}", i)).await })
        })
        .collect();

    for task in tasks {
        let clips = task.await.unwrap().unwrap();
        assert_eq!(clips.len(), 1);
    }

    assert_eq!(registry_ids(&h.registry).await, vec!["k2"]);
    assert_eq!(h.upstream.calls_for("s2").len(), 16);
    // Calls that listed the pool before the eviction may still try k1 once
    let s1_calls = h.upstream.calls_for("s1").len();
    assert!((1..=16).contains(&s1_calls));
    assert_eq!(h.ledger.len(), 16 + s1_calls);
}
