use std::sync::Arc;

use gatewarden_lib::limiter::{CounterService, CounterStore, MemoryCounterStore};

#[tokio::test]
async fn serialized_requests_allow_exactly_limit() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = CounterService::new(Arc::new(MemoryCounterStore::new()));
    let key = "rate_limit:api:ip:1.2.3.4";

    let mut allowed = 0;
    for _ in 0..10 {
        let decision = service.check(key, 4, 60).await?;
        if decision.allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 4);
    Ok(())
}

#[tokio::test]
async fn distinct_keys_are_independent() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = CounterService::new(Arc::new(MemoryCounterStore::new()));

    for _ in 0..3 {
        assert!(service.check("rate_limit:api:ip:10.0.0.1", 3, 60).await?.allowed);
    }
    assert!(!service.check("rate_limit:api:ip:10.0.0.1", 3, 60).await?.allowed);

    // The second client still has its full budget.
    assert!(service.check("rate_limit:api:ip:10.0.0.2", 3, 60).await?.allowed);
    Ok(())
}

#[tokio::test]
async fn concurrent_same_key_requests_observe_consistent_count(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = Arc::new(CounterService::new(Arc::new(MemoryCounterStore::new())));
    let key = "rate_limit:burst:ip:198.51.100.1";

    let mut handles = vec![];
    for _ in 0..12 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.check(key, 5, 60).await.map(|d| d.allowed)
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await?? {
            allowed += 1;
        }
    }
    // Per-key writes are totally ordered, so exactly `limit` slots exist
    // no matter how the tasks interleave.
    assert_eq!(allowed, 5);
    Ok(())
}

#[tokio::test]
async fn persisted_value_is_a_json_timestamp_list(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(MemoryCounterStore::new());
    let service = CounterService::new(store.clone());
    let key = "rate_limit:api:ip:10.9.8.7";

    service.check(key, 5, 60).await?;
    service.check(key, 5, 60).await?;

    let raw = store.load(key).await?.expect("entry persisted");
    let timestamps: Vec<i64> = serde_json::from_str(&raw)?;
    assert_eq!(timestamps.len(), 2);
    assert!(timestamps[0] <= timestamps[1]);
    Ok(())
}

#[tokio::test]
async fn corrupt_entry_resets_the_window() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(MemoryCounterStore::new());
    let service = CounterService::new(store.clone());
    let key = "rate_limit:api:ip:10.0.0.9";

    store.store(key, "not json at all").await?;
    let decision = service.check(key, 2, 60).await?;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);
    Ok(())
}

#[tokio::test]
async fn peek_reports_without_consuming_budget(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = CounterService::new(Arc::new(MemoryCounterStore::new()));
    let key = "rate_limit:info:ip:10.0.0.3";

    for _ in 0..5 {
        let peeked = service.peek(key, 2, 60).await?;
        assert_eq!(peeked.remaining, 2);
    }

    assert!(service.check(key, 2, 60).await?.allowed);
    assert!(service.check(key, 2, 60).await?.allowed);
    assert!(!service.check(key, 2, 60).await?.allowed);
    Ok(())
}

#[tokio::test]
async fn denied_request_reports_retry_hint() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = CounterService::new(Arc::new(MemoryCounterStore::new()));
    let key = "rate_limit:api:ip:10.0.0.4";

    for _ in 0..3 {
        service.check(key, 3, 10).await?;
    }
    let denied = service.check(key, 3, 10).await?;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.retry_after_secs >= 1);
    assert!(denied.retry_after_secs <= 10);
    Ok(())
}
