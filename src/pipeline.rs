//! The composition root, decoupled from any entry point.
//!
//! Annotation-driven wiring has no place here: the builder constructs the
//! throttler, dispatcher, and grouper explicitly, registers channels from
//! configuration, and spawns the background reaper in one visible place.

use crate::{
    channels::{LogChannel, WebhookChannel},
    config::Config,
    core::NotificationChannel,
    dispatch::Dispatcher,
    grouping::Grouper,
    task_manager::TaskManager,
    throttle::Throttler,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// A handle to the running pipeline.
pub struct Pipeline {
    throttler: Arc<Throttler>,
    dispatcher: Arc<Dispatcher>,
    grouper: Grouper,
    task_manager: TaskManager,
}

impl Pipeline {
    /// Creates a new `PipelineBuilder` to construct a `Pipeline`.
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// The grouping engine; producers call `add_alert` on it.
    pub fn grouper(&self) -> &Grouper {
        &self.grouper
    }

    /// The dispatcher, for direct sends and provider self-tests.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The throttle engine, for diagnostics and resets.
    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// Waits for the shutdown signal, flushes every pending group, and then
    /// joins the background tasks. Buffered alerts are delivered, not
    /// dropped, on the way out.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Flushing pending alert groups...");

        let results = self.grouper.flush_all().await;
        if !results.is_empty() {
            debug!(results = results.len(), "Final flush dispatched pending groups");
        }

        self.task_manager.shutdown().await;
        info!("Alert pipeline shut down.");
        Ok(())
    }
}

/// Builder for the alert pipeline.
///
/// Separates component construction from running, and provides a convenient
/// way to override channels for testing purposes.
pub struct PipelineBuilder {
    config: Config,
    channels_override: Option<Vec<Arc<dyn NotificationChannel>>>,
    reaper_interval: Duration,
}

impl PipelineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channels_override: None,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
        }
    }

    /// Replaces the configured channels with the given set. Used by tests.
    pub fn channels_override(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels_override = Some(channels);
        self
    }

    /// Overrides how often the throttle reaper runs.
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Builds and initializes all pipeline components, returning a runnable
    /// `Pipeline`. Invalid throttle configuration fails here, fast.
    pub fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<Pipeline> {
        let config = self.config;
        config.throttle.validate()?;

        let task_manager = TaskManager::new(shutdown_rx);

        let throttler = Arc::new(Throttler::new(config.throttle.clone()));
        let dispatcher = Arc::new(Dispatcher::new(throttler.clone()));

        match self.channels_override {
            Some(channels) => {
                for channel in channels {
                    dispatcher.register_provider(channel);
                }
            }
            None => {
                if let Some(webhook) = &config.channels.webhook {
                    debug!(url = %webhook.url, "Registering webhook channel");
                    dispatcher.register_provider(Arc::new(WebhookChannel::new(webhook)));
                }
                if config.channels.log_enabled {
                    dispatcher.register_provider(Arc::new(LogChannel::default()));
                }
            }
        }

        let grouper = Grouper::new(config.throttle.clone(), dispatcher.clone());

        let reaper_throttler = throttler.clone();
        let reaper_shutdown_rx = task_manager.get_shutdown_rx();
        let reaper_interval = self.reaper_interval;
        task_manager.spawn("ThrottleReaper", async move {
            reaper_throttler
                .run_reaper(reaper_interval, reaper_shutdown_rx)
                .await;
        });

        info!(
            providers = ?dispatcher.provider_names(),
            grouping = config.throttle.grouping,
            "Alert pipeline initialized"
        );

        Ok(Pipeline {
            throttler,
            dispatcher,
            grouper,
            task_manager,
        })
    }
}
