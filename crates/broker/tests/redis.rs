//! Tests against a live Redis server at `REDIS_URL` (default `redis://127.0.0.1:6379`).
//! Run with `cargo test -- --ignored`.

use std::time::Duration;

use broker::{
    ExecutionResult, FailureKind, Job, RedisCache, RedisQueue, ResultCache, SubmissionQueue,
};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into())
}

fn unique_queue() -> String {
    format!("codexec-test-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn queue_is_fifo_for_one_producer() {
    let queue = RedisQueue::connect(&redis_url(), unique_queue())
        .await
        .unwrap();
    let first = Job::new("python", "print(1)");
    let second = Job::new("python", "print(2)");
    queue.enqueue(&first).await.unwrap();
    queue.enqueue(&second).await.unwrap();

    assert_eq!(queue.dequeue().await.unwrap(), first);
    assert_eq!(queue.dequeue().await.unwrap(), second);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn enqueue_is_not_blocked_by_pending_dequeue() {
    let queue = RedisQueue::connect(&redis_url(), unique_queue())
        .await
        .unwrap();
    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.dequeue().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = Job::new("node", "console.log(1)");
    tokio::time::timeout(Duration::from_secs(1), queue.enqueue(&job))
        .await
        .expect("enqueue stalled behind BRPOP")
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(received, job);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn cache_entry_expires() {
    let cache = RedisCache::connect(&redis_url()).await.unwrap();
    let key = uuid::Uuid::new_v4().to_string();
    let result = ExecutionResult::failed(FailureKind::Timeout, "budget exceeded");

    cache.put(&key, &result, Duration::from_secs(1)).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(result));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn connect_fails_when_unreachable() {
    let err = RedisQueue::connect("redis://127.0.0.1:1", unique_queue())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("connect"), "got: {err}");
}
