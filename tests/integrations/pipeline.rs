//! End-to-end scenarios wired through the `PipelineBuilder`.

use alertpipe::channels::test_utils::RecordingChannel;
use alertpipe::config::ThrottleConfig;
use alertpipe::core::AlertEvent;
use alertpipe::grouping::GroupKey;
use alertpipe::pipeline::Pipeline;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;

fn build_pipeline(
    throttle: ThrottleConfig,
) -> Result<(Pipeline, Arc<RecordingChannel>, watch::Sender<bool>)> {
    helpers::init_tracing();
    let channel = RecordingChannel::new("recording");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Pipeline::builder(helpers::test_config(throttle))
        .channels_override(vec![channel.clone()])
        .build(shutdown_rx)?;
    Ok((pipeline, channel, shutdown_tx))
}

#[tokio::test]
async fn rate_limit_admits_five_then_rejects_the_sixth() -> Result<()> {
    // rateLimit=5, ratePeriod=1s, cooldown=100ms, grouping off.
    let throttle = ThrottleConfig {
        rate_limit: 5,
        rate_period_ms: 1_000,
        cooldown_ms: 100,
        grouping: false,
        ..Default::default()
    };
    let (pipeline, _channel, _shutdown_tx) = build_pipeline(throttle)?;
    let throttler = pipeline.throttler();

    for i in 0..5 {
        let event = AlertEvent::new_minimal(&i.to_string(), "burst");
        assert!(throttler.try_acquire(&event), "send {} should be admitted", i);
    }
    let sixth = AlertEvent::new_minimal("5", "burst");
    assert!(!throttler.try_acquire(&sixth));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn matching_events_collapse_into_one_grouped_notification() -> Result<()> {
    // groupWait=100ms, maxGroupSize=100.
    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 1,
        grouping: true,
        group_wait_ms: 100,
        max_group_size: 100,
        group_by_labels: vec!["service".to_string()],
        ..Default::default()
    };
    let (pipeline, channel, _shutdown_tx) = build_pipeline(throttle)?;
    let grouper = pipeline.grouper();

    grouper
        .add_alert(helpers::service_event("a", "high-cpu", "api"))
        .await;
    grouper
        .add_alert(helpers::service_event("b", "high-cpu", "api"))
        .await;

    assert_eq!(grouper.pending_group_count(), 1);
    assert_eq!(grouper.pending_alert_count(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let received = channel.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].message.contains("[2 alerts grouped]"));
    assert_eq!(grouper.pending_group_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn different_group_labels_stay_in_separate_groups() -> Result<()> {
    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 1,
        grouping: true,
        group_wait_ms: 60_000,
        max_group_size: 100,
        group_by_labels: vec!["service".to_string()],
        ..Default::default()
    };
    let (pipeline, _channel, _shutdown_tx) = build_pipeline(throttle)?;
    let grouper = pipeline.grouper();

    grouper
        .add_alert(helpers::service_event("a", "high-cpu", "api"))
        .await;
    grouper
        .add_alert(helpers::service_event("b", "high-cpu", "web"))
        .await;

    assert_eq!(grouper.pending_group_count(), 2);
    Ok(())
}

#[tokio::test]
async fn direct_dispatch_and_self_test_reach_a_named_provider() -> Result<()> {
    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 60_000,
        grouping: false,
        ..Default::default()
    };
    let (pipeline, channel, _shutdown_tx) = build_pipeline(throttle)?;
    let dispatcher = pipeline.dispatcher();

    let event = helpers::service_event("a", "high-cpu", "api");
    // Use up the cooldown for this alert id.
    assert!(dispatcher.dispatch(&event).await[0].success);

    // The named-provider path bypasses the throttle.
    let direct = dispatcher.dispatch_to(&event, "recording").await;
    assert!(direct.success);
    assert_eq!(channel.received_count(), 2);

    assert!(dispatcher.test_provider("recording").await.success);
    assert!(!dispatcher.test_provider("missing").await.success);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn flush_listener_observes_grouped_events() -> Result<()> {
    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 1,
        grouping: true,
        group_wait_ms: 60_000,
        max_group_size: 100,
        group_by_labels: vec!["service".to_string()],
        ..Default::default()
    };
    let (pipeline, _channel, _shutdown_tx) = build_pipeline(throttle)?;
    let grouper = pipeline.grouper();

    let seen: Arc<std::sync::Mutex<Vec<(String, usize)>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    grouper.add_listener(move |key: &GroupKey, events: &[AlertEvent]| {
        seen_clone
            .lock()
            .unwrap()
            .push((key.alert_name().to_string(), events.len()));
    });

    grouper
        .add_alert(helpers::service_event("a", "high-cpu", "api"))
        .await;
    grouper
        .add_alert(helpers::service_event("b", "high-cpu", "api"))
        .await;
    grouper.flush_all().await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![("high-cpu".to_string(), 2)]);
    Ok(())
}
