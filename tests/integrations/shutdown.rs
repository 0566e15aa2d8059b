//! Integration test for graceful shutdown: buffered groups are flushed,
//! not dropped, when the pipeline stops.

use alertpipe::channels::test_utils::RecordingChannel;
use alertpipe::config::ThrottleConfig;
use alertpipe::pipeline::Pipeline;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;

#[tokio::test]
async fn shutdown_flushes_pending_groups() -> Result<()> {
    helpers::init_tracing();
    let channel = RecordingChannel::new("recording");

    // A group wait far longer than the test, so only shutdown can flush.
    let throttle = ThrottleConfig {
        rate_limit: 0,
        cooldown_ms: 1,
        grouping: true,
        group_wait_ms: 3_600_000,
        max_group_size: 100,
        group_by_labels: vec!["service".to_string()],
        ..Default::default()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Pipeline::builder(helpers::test_config(throttle))
        .channels_override(vec![channel.clone()])
        .build(shutdown_rx)?;

    let grouper = pipeline.grouper().clone();
    grouper
        .add_alert(helpers::service_event("a", "high-cpu", "api"))
        .await;
    grouper
        .add_alert(helpers::service_event("b", "high-cpu", "api"))
        .await;
    assert_eq!(grouper.pending_group_count(), 1);

    let run_handle = tokio::spawn(pipeline.run());
    shutdown_tx.send(true)?;
    run_handle.await??;

    channel.wait_for_count(1, Duration::from_secs(5)).await;
    let received = channel.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].message.contains("[2 alerts grouped]"));
    assert_eq!(grouper.pending_group_count(), 0);
    Ok(())
}
