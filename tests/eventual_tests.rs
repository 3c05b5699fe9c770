//! # Eventual Value Tests
//!
//! Public-API tests for the deferred value type:
//! - construction: resolved, pending, from_future, from_blocking, wrap
//! - projections: apply, get_attr, get_item, chaining
//! - settlement: broadcast to every consumer, failure propagation

use rigging::{Eventual, RiggingError};
use serde_json::json;

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[tokio::test]
async fn every_constructor_settles_to_a_concrete_value() {
    assert_eq!(Eventual::resolved(json!("a")).await, Ok(json!("a")));
    assert_eq!(Eventual::wrap(7).await, Ok(json!(7)));
    assert_eq!(
        Eventual::from_future(async { json!([1, 2]) }).await,
        Ok(json!([1, 2]))
    );
    assert_eq!(
        Eventual::from_blocking(|| json!("worker")).await,
        Ok(json!("worker"))
    );
}

#[tokio::test]
async fn wrap_flattens_arbitrary_nesting() {
    let deep = Eventual::wrap(Eventual::wrap(Eventual::wrap(Eventual::from_future(
        async { 5 },
    ))));
    assert_eq!(deep.await, Ok(json!(5)));
}

#[tokio::test]
async fn futures_yielding_deferred_values_flatten() {
    let inner = Eventual::from_blocking(|| json!({"port": 8080}));
    let outer = Eventual::from_future(async move { inner });

    assert_eq!(outer.get_attr("port").await, Ok(json!(8080)));
}

// ============================================================================
// PROJECTIONS
// ============================================================================

#[tokio::test]
async fn projections_can_be_wired_before_settlement() {
    let (endpoint, mut resolver) = Eventual::pending();

    // Consumers build graph edges off a value nobody has produced yet.
    let host = endpoint.get_attr("host");
    let first_tag = endpoint.get_attr("tags").get_item(0);
    let upper = host.apply(|v| json!(v.as_str().unwrap().to_uppercase()));

    resolver
        .resolve(json!({"host": "db.internal", "tags": ["primary", "ssd"]}))
        .unwrap();

    assert_eq!(host.await, Ok(json!("db.internal")));
    assert_eq!(first_tag.await, Ok(json!("primary")));
    assert_eq!(upper.await, Ok(json!("DB.INTERNAL")));
}

#[tokio::test]
async fn apply_composes_with_deferred_results() {
    let base = Eventual::resolved(json!(2));
    let squared = base.apply(|v| {
        let n = v.as_i64().unwrap();
        Eventual::from_blocking(move || json!(n * n))
    });

    assert_eq!(squared.await, Ok(json!(4)));
}

// ============================================================================
// FAILURE PROPAGATION
// ============================================================================

#[tokio::test]
async fn one_failure_poisons_the_whole_chain() {
    let (source, mut resolver) = Eventual::pending();
    let chained = source.get_attr("a").get_item(3).apply(|v| v);

    resolver
        .fail(RiggingError::Projection("root cause".into()))
        .unwrap();

    assert_eq!(
        chained.await,
        Err(RiggingError::Projection("root cause".into()))
    );
}

#[tokio::test]
async fn failures_do_not_travel_backwards() {
    let source = Eventual::resolved(json!({"ok": true}));
    let broken = source.get_attr("missing");

    assert!(broken.await.is_err());
    // The source is untouched by its projection's failure.
    assert_eq!(source.get_attr("ok").await, Ok(json!(true)));
}

// ============================================================================
// BROADCAST SETTLEMENT
// ============================================================================

#[tokio::test]
async fn many_tasks_observe_one_settlement() {
    let (eventual, mut resolver) = Eventual::pending();

    let consumers: Vec<_> = (0..8)
        .map(|_| {
            let eventual = eventual.clone();
            tokio::spawn(async move { eventual.await })
        })
        .collect();

    resolver.resolve(json!({"round": 1})).unwrap();

    for consumer in consumers {
        assert_eq!(consumer.await.unwrap(), Ok(json!({"round": 1})));
    }
}

#[tokio::test]
async fn settled_reads_do_not_consume_the_handle() {
    let eventual = Eventual::resolved(json!(3));

    assert_eq!(eventual.settled().await, Ok(json!(3)));
    assert_eq!(eventual.settled().await, Ok(json!(3)));
    assert_eq!(eventual.peek(), Some(Ok(json!(3))));
}
