//! Periodic learning job over the usage log.

use polyglot_core::config::LearningConfig;
use polyglot_memory::{learn_from_log, Learner, Store, UsageLog};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to the running learning loop.
///
/// `stop` lets an in-flight cycle finish before the task exits, so the store
/// and the pending batch are never left half-written.
pub struct LearningJob {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LearningJob {
    pub fn spawn(store: Store, log: Arc<UsageLog>, config: LearningConfig) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(learning_loop(store, log, config, rx));
        Self { shutdown, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("learn: loop ended abnormally: {e}");
        }
    }
}

async fn learning_loop(
    store: Store,
    log: Arc<UsageLog>,
    config: LearningConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let learner = Learner::new(config);
    let period = Duration::from_secs(config.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("learn: every {}s over {}", period.as_secs(), log.path().display());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        // The cycle runs outside the select so shutdown cannot cut it short.
        if let Err(e) = learn_from_log(&store, &log, &learner).await {
            warn!("learn: cycle failed, batch kept for retry: {e}");
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!("learn: stopped");
}
