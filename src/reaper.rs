//! Background removal of expired records.

use crate::error::Error;
use crate::record_store::DynRecordStore;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to the running reaper task.
pub struct Reaper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Reaper {
    /// Start sweeping `store` every `interval`. The first sweep runs immediately.
    #[must_use]
    pub fn spawn(store: DynRecordStore, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = OffsetDateTime::now_utc().unix_timestamp();
                        if let Err(err) = sweep(&store, now).await {
                            warn!("expiration sweep failed: {err}");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("reaper stopped");
        });
        info!("reaping expired records every {}s", interval.as_secs());
        Reaper { stop, task }
    }

    /// Stop the reaper, waiting for an in-flight sweep to finish.
    pub async fn stop(self) {
        // The task may already be gone if it panicked, nothing to signal then.
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!("reaper task failed: {err}");
        }
    }
}

/// Delete every record of `store` expired at `now`, returning how many were removed.
///
/// # Errors
///
/// Returns an error if the expired records can't be listed or one can't be deleted. Records
/// deleted by someone else in the meantime are not an error.
pub async fn sweep(store: &DynRecordStore, now: i64) -> Result<usize, Error> {
    let mut removed = 0;
    for key in store.list_expired(now).await? {
        match store.delete(&key).await {
            Ok(()) => {
                debug!("reaped {key}");
                removed += 1;
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }
    if removed > 0 {
        info!("reaped {removed} expired records");
    }
    Ok(removed)
}
