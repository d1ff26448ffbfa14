//! Pipeline behavior against the in-memory store with scripted collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tweet_pulse::engine::{
    AggregateReader, FetchWorker, Pipeline, PipelineConfig, PipelineState, RetryPolicy,
    ScoreWorker, TopicChange, TopicController, TweetService,
};
use tweet_pulse::model::{Aggregate, QueueName, SentimentScore, Topic};
use tweet_pulse::search::{SearchError, TweetSearch};
use tweet_pulse::sentiment::{ScoreError, SentimentScorer};
use tweet_pulse::store::{DurableStore, MemoryStore, TxMode};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedSearch {
    results: Mutex<HashMap<String, Vec<String>>>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn with(topic: &str, tweets: &[&str]) -> Self {
        let search = Self::default();
        search.results.lock().unwrap().insert(
            topic.to_string(),
            tweets.iter().map(|t| t.to_string()).collect(),
        );
        search
    }
}

#[async_trait]
impl TweetSearch for ScriptedSearch {
    async fn search(&self, topic: &Topic, limit: usize) -> Result<Vec<String>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let results = self.results.lock().unwrap();
        Ok(results
            .get(topic.as_str())
            .map(|tweets| tweets.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

struct FailingSearch;

#[async_trait]
impl TweetSearch for FailingSearch {
    async fn search(&self, _topic: &Topic, _limit: usize) -> Result<Vec<String>, SearchError> {
        Err(SearchError::Status {
            status: 503,
            body: "over capacity".to_string(),
        })
    }
}

/// Scores from a mutable table; unknown texts score 0.5.
#[derive(Default)]
struct TableScorer {
    scores: Mutex<HashMap<String, f64>>,
}

impl TableScorer {
    fn set(&self, text: &str, score: f64) {
        self.scores.lock().unwrap().insert(text.to_string(), score);
    }
}

#[async_trait]
impl SentimentScorer for TableScorer {
    async fn score(&self, text: &str) -> Result<SentimentScore, ScoreError> {
        let score = self.scores.lock().unwrap().get(text).copied().unwrap_or(0.5);
        Ok(SentimentScore::new(score).unwrap())
    }
}

struct FailingScorer {
    calls: AtomicUsize,
}

#[async_trait]
impl SentimentScorer for FailingScorer {
    async fn score(&self, _text: &str) -> Result<SentimentScore, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ScoreError::Timeout(Duration::from_secs(30)))
    }
}

/// Never answers. Signals `entered` when a call starts.
struct HangingScorer {
    entered: Arc<Notify>,
}

#[async_trait]
impl SentimentScorer for HangingScorer {
    async fn score(&self, _text: &str) -> Result<SentimentScore, ScoreError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> PipelineConfig {
    PipelineConfig {
        fetch_interval: Duration::from_millis(10),
        search_limit: 100,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        },
        idle_delay: Duration::from_millis(1),
    }
}

/// Queue contents, read without consuming them.
async fn peek(store: &dyn DurableStore, queue: QueueName) -> Vec<String> {
    let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
    let mut items = Vec::new();
    while let Some(item) = tx.try_dequeue(queue).await.unwrap() {
        items.push(item);
    }
    tx.abort().await.unwrap();
    items
}

async fn enqueue(store: &dyn DurableStore, queue: QueueName, items: &[&str]) {
    let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
    for item in items {
        tx.enqueue(queue, item).await.unwrap();
    }
    tx.commit().await.unwrap();
}

async fn put_scores(store: &dyn DurableStore, scores: &[(&str, f64)]) {
    let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
    for (key, value) in scores {
        tx.put(key, *value).await.unwrap();
    }
    tx.commit().await.unwrap();
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Topic changes and the aggregate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_topic_resets_the_aggregate() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    put_scores(store.as_ref(), &[("old", 0.9), ("older", 0.1)]).await;
    let service = TweetService::standalone(Arc::clone(&store));

    let change = service.set_tweet_subject(Some("rust")).await.unwrap();
    assert_eq!(change, TopicChange::Set { drained: 0 });

    let aggregate = service.get_average_sentiment_score().await.unwrap();
    assert_eq!(aggregate, Some(Aggregate::default()));
    assert_eq!(peek(store.as_ref(), QueueName::Topics).await, ["rust"]);
}

#[tokio::test]
async fn blank_and_missing_subjects_change_nothing() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let service = TweetService::standalone(Arc::clone(&store));
    service.set_tweet_subject(Some("A")).await.unwrap();
    put_scores(store.as_ref(), &[("t1", 0.8)]).await;

    for subject in [Some(""), Some("   "), None] {
        let change = service.set_tweet_subject(subject).await.unwrap();
        assert_eq!(change, TopicChange::Ignored);
    }

    assert_eq!(peek(store.as_ref(), QueueName::Topics).await, ["A"]);
    let aggregate = service.get_average_sentiment_score().await.unwrap().unwrap();
    assert_eq!(aggregate.tweet_count, 1);
    assert_eq!(aggregate.average_score, 0.8);
}

#[tokio::test]
async fn second_topic_replaces_the_first() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let topics = TopicController::new(Arc::clone(&store));

    topics.set_topic("A").await.unwrap();
    let change = topics.set_topic("B").await.unwrap();

    assert_eq!(change, TopicChange::Set { drained: 1 });
    assert_eq!(peek(store.as_ref(), QueueName::Topics).await, ["B"]);
}

#[tokio::test]
async fn average_is_the_mean_of_stored_scores() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    put_scores(store.as_ref(), &[("a", 0.25), ("b", 0.75), ("c", 0.5)]).await;

    let aggregate = AggregateReader::new(store).average().await.unwrap();
    assert_eq!(aggregate.tweet_count, 3);
    assert!((aggregate.average_score - 0.5).abs() < 1e-12);
}

#[tokio::test]
async fn concurrent_reads_never_see_a_partial_clear() {
    const SCORES: usize = 50;
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let topics = TopicController::new(Arc::clone(&store));
    let reader = AggregateReader::new(Arc::clone(&store));

    let keys: Vec<String> = (0..SCORES).map(|i| format!("tweet-{i}")).collect();
    let writer_store = Arc::clone(&store);
    let writer = tokio::spawn(async move {
        for round in 0..40 {
            let mut tx = writer_store.begin(TxMode::ReadWrite).await.unwrap();
            for key in &keys {
                tx.put(key, 1.0).await.unwrap();
            }
            tx.commit().await.unwrap();
            topics.set_topic(&format!("topic-{round}")).await.unwrap();
        }
    });

    let mut observed = 0;
    while !writer.is_finished() {
        let aggregate = reader.average().await.unwrap();
        assert!(
            aggregate.tweet_count == 0 || aggregate.tweet_count == SCORES as u64,
            "partial state observed: {aggregate:?}"
        );
        if aggregate.tweet_count > 0 {
            assert_eq!(aggregate.average_score, 1.0);
        }
        observed += 1;
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    assert!(observed > 0);

    assert_eq!(peek(store.as_ref(), QueueName::Topics).await, ["topic-39"]);
}

// ---------------------------------------------------------------------------
// Fetch worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_moves_search_results_into_the_tweet_queue_in_order() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Topics, &["X"]).await;
    let search = Arc::new(ScriptedSearch::with("X", &["t1", "t2", "t3"]));
    let mut fetch = FetchWorker::new(Arc::clone(&store), search.clone(), test_config());

    assert!(fetch.fetch_once().await.unwrap());

    assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["t1", "t2", "t3"]);
    assert!(peek(store.as_ref(), QueueName::Topics).await.is_empty());

    // Nothing left to fetch: the topic is consumed after one attempt.
    assert!(!fetch.fetch_once().await.unwrap());
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_with_no_matches_still_consumes_the_topic() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Topics, &["nothing"]).await;
    let mut fetch = FetchWorker::new(
        Arc::clone(&store),
        Arc::new(ScriptedSearch::default()),
        test_config(),
    );

    assert!(fetch.fetch_once().await.unwrap());
    assert!(peek(store.as_ref(), QueueName::Topics).await.is_empty());
    assert!(peek(store.as_ref(), QueueName::Tweets).await.is_empty());
}

#[tokio::test]
async fn fetch_respects_the_search_limit() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Topics, &["X"]).await;
    let config = PipelineConfig {
        search_limit: 2,
        ..test_config()
    };
    let search = Arc::new(ScriptedSearch::with("X", &["t1", "t2", "t3"]));
    let mut fetch = FetchWorker::new(Arc::clone(&store), search, config);

    fetch.fetch_once().await.unwrap();
    assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["t1", "t2"]);
}

#[tokio::test]
async fn failed_search_keeps_the_topic_then_dead_letters_it() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Topics, &["X"]).await;
    let mut fetch = FetchWorker::new(Arc::clone(&store), Arc::new(FailingSearch), test_config());

    for _ in 0..2 {
        let err = fetch.fetch_once().await.unwrap_err();
        assert_eq!(err.kind(), "search");
        assert_eq!(peek(store.as_ref(), QueueName::Topics).await, ["X"]);
    }

    let err = fetch.fetch_once().await.unwrap_err();
    assert!(err.is_collaborator());
    assert!(peek(store.as_ref(), QueueName::Topics).await.is_empty());
    assert_eq!(peek(store.as_ref(), QueueName::DeadTopics).await, ["X"]);
    assert!(peek(store.as_ref(), QueueName::Tweets).await.is_empty());
}

// ---------------------------------------------------------------------------
// Score worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scoring_records_and_rescoring_overwrites() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let scorer = Arc::new(TableScorer::default());
    let mut score = ScoreWorker::new(Arc::clone(&store), scorer.clone(), test_config());
    let reader = AggregateReader::new(Arc::clone(&store));

    enqueue(store.as_ref(), QueueName::Tweets, &["t1"]).await;
    scorer.set("t1", 0.8);
    assert!(score.score_once().await.unwrap());
    assert_eq!(
        reader.average().await.unwrap(),
        Aggregate {
            tweet_count: 1,
            average_score: 0.8
        }
    );

    enqueue(store.as_ref(), QueueName::Tweets, &["t1"]).await;
    scorer.set("t1", 0.2);
    assert!(score.score_once().await.unwrap());
    assert_eq!(
        reader.average().await.unwrap(),
        Aggregate {
            tweet_count: 1,
            average_score: 0.2
        }
    );

    assert!(!score.score_once().await.unwrap());
}

#[tokio::test]
async fn negative_scores_are_data_not_failures() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let scorer = Arc::new(TableScorer::default());
    scorer.set("awful", -1.0);
    enqueue(store.as_ref(), QueueName::Tweets, &["awful"]).await;

    let mut score = ScoreWorker::new(Arc::clone(&store), scorer, test_config());
    assert!(score.score_once().await.unwrap());

    let aggregate = AggregateReader::new(store).average().await.unwrap();
    assert_eq!(aggregate.tweet_count, 1);
    assert_eq!(aggregate.average_score, -1.0);
}

#[tokio::test]
async fn failed_scoring_records_nothing_and_dead_letters_after_retries() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Tweets, &["t1", "t2"]).await;
    let scorer = Arc::new(FailingScorer {
        calls: AtomicUsize::new(0),
    });
    let mut score = ScoreWorker::new(Arc::clone(&store), scorer.clone(), test_config());

    for _ in 0..2 {
        let err = score.score_once().await.unwrap_err();
        assert_eq!(err.kind(), "scoring");
        assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["t1", "t2"]);
    }
    score.score_once().await.unwrap_err();

    assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["t2"]);
    assert_eq!(peek(store.as_ref(), QueueName::DeadTweets).await, ["t1"]);
    let aggregate = AggregateReader::new(store).average().await.unwrap();
    assert_eq!(aggregate, Aggregate::default());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_pipeline_scores_a_new_topic() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let search = Arc::new(ScriptedSearch::with("rust", &["t1", "t2", "t3"]));
    let scorer = Arc::new(TableScorer::default());
    scorer.set("t1", 0.2);
    scorer.set("t2", 0.4);
    scorer.set("t3", 0.9);

    let handle = Pipeline::new(Arc::clone(&store), search, scorer, test_config()).start();
    assert_eq!(handle.state(), PipelineState::Running);
    let service = handle.service();

    service.set_tweet_subject(Some("rust")).await.unwrap();

    eventually("all three tweets scored", || {
        let service = service.clone();
        async move {
            service
                .get_average_sentiment_score()
                .await
                .unwrap()
                .is_some_and(|a| a.tweet_count == 3)
        }
    })
    .await;

    let aggregate = service.get_average_sentiment_score().await.unwrap().unwrap();
    assert!((aggregate.average_score - 0.5).abs() < 1e-12);

    handle.stop().await;
}

#[tokio::test]
async fn shutdown_interrupts_an_in_flight_call_and_keeps_the_item() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    enqueue(store.as_ref(), QueueName::Tweets, &["stuck"]).await;
    let entered = Arc::new(Notify::new());
    let scorer = Arc::new(HangingScorer {
        entered: Arc::clone(&entered),
    });

    let handle = Pipeline::new(
        Arc::clone(&store),
        Arc::new(ScriptedSearch::default()),
        scorer,
        test_config(),
    )
    .start();
    let service = handle.service();

    tokio::time::timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("scorer should be called");

    handle.shutdown();
    assert_eq!(handle.state(), PipelineState::CancelRequested);
    assert_eq!(service.state(), PipelineState::CancelRequested);
    // A repeated request is a no-op.
    handle.shutdown();
    assert_eq!(handle.state(), PipelineState::CancelRequested);

    // The remote operations wind down with the pipeline.
    assert_eq!(
        service.set_tweet_subject(Some("late")).await.unwrap(),
        TopicChange::Ignored
    );
    assert_eq!(service.get_average_sentiment_score().await.unwrap(), None);

    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("workers should stop promptly");
    assert_eq!(service.state(), PipelineState::Stopped);

    assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["stuck"]);
    assert!(peek(store.as_ref(), QueueName::Topics).await.is_empty());
    let aggregate = AggregateReader::new(store).average().await.unwrap();
    assert_eq!(aggregate, Aggregate::default());
}

#[tokio::test]
async fn workers_survive_failing_iterations() {
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let handle = Pipeline::new(
        Arc::clone(&store),
        Arc::new(FailingSearch),
        Arc::new(TableScorer::default()),
        test_config(),
    )
    .start();
    let service = handle.service();

    service.set_tweet_subject(Some("doomed")).await.unwrap();
    eventually("topic dead-lettered", || {
        let store = Arc::clone(&store);
        async move { peek(store.as_ref(), QueueName::DeadTopics).await == ["doomed"] }
    })
    .await;

    // The fetch worker is still alive and picks up the next topic.
    service.set_tweet_subject(Some("next")).await.unwrap();
    eventually("second topic dead-lettered", || {
        let store = Arc::clone(&store);
        async move { peek(store.as_ref(), QueueName::DeadTopics).await.len() == 2 }
    })
    .await;

    handle.stop().await;
}

#[tokio::test]
async fn journaled_store_resumes_pending_work_after_restart() {
    let path = std::env::temp_dir().join(format!("pulse-restart-{}.jsonl", uuid::Uuid::new_v4()));

    {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::open(&path).await.unwrap());
        let service = TweetService::standalone(Arc::clone(&store));
        service.set_tweet_subject(Some("X")).await.unwrap();
        let mut fetch = FetchWorker::new(
            Arc::clone(&store),
            Arc::new(ScriptedSearch::with("X", &["t1", "t2"])),
            test_config(),
        );
        fetch.fetch_once().await.unwrap();
    }

    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::open(&path).await.unwrap());
    assert_eq!(peek(store.as_ref(), QueueName::Tweets).await, ["t1", "t2"]);

    let mut score = ScoreWorker::new(
        Arc::clone(&store),
        Arc::new(TableScorer::default()),
        test_config(),
    );
    while score.score_once().await.unwrap() {}
    let aggregate = AggregateReader::new(store).average().await.unwrap();
    assert_eq!(aggregate.tweet_count, 2);

    let _ = std::fs::remove_file(&path);
}
