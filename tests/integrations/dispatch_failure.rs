//! Integration test for partial-failure aggregation across providers.

use alertpipe::channels::test_utils::{FailingChannel, RecordingChannel};
use alertpipe::config::ThrottleConfig;
use alertpipe::pipeline::Pipeline;
use anyhow::Result;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;

#[tokio::test]
async fn one_failing_provider_never_blocks_the_others() -> Result<()> {
    helpers::init_tracing();
    let healthy = RecordingChannel::new("healthy");
    let broken = FailingChannel::new("broken");

    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 1,
        grouping: false,
        ..Default::default()
    };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Pipeline::builder(helpers::test_config(throttle))
        .channels_override(vec![healthy.clone(), broken])
        .build(shutdown_rx)?;

    let results = pipeline
        .dispatcher()
        .dispatch(&helpers::service_event("a", "high-cpu", "api"))
        .await;

    // One result per provider, the aggregate never throws.
    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|r| r.success).count(), 1);
    assert_eq!(results.iter().filter(|r| !r.success).count(), 1);

    let failed = results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.provider, "broken");
    assert!(failed
        .error_details
        .as_deref()
        .unwrap()
        .contains("simulated transport failure"));

    // The healthy provider delivered despite its failing sibling.
    assert_eq!(healthy.received_count(), 1);
    Ok(())
}

#[tokio::test]
async fn throttled_events_produce_a_policy_result_not_provider_calls() -> Result<()> {
    helpers::init_tracing();
    let healthy = RecordingChannel::new("healthy");

    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 60_000,
        grouping: false,
        ..Default::default()
    };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Pipeline::builder(helpers::test_config(throttle))
        .channels_override(vec![healthy.clone()])
        .build(shutdown_rx)?;

    let event = helpers::service_event("a", "high-cpu", "api");
    assert!(pipeline.dispatcher().dispatch(&event).await[0].success);

    let second = pipeline.dispatcher().dispatch(&event).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].provider, "throttler");
    assert!(!second[0].success);
    assert_eq!(healthy.received_count(), 1);
    Ok(())
}
