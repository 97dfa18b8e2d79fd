use std::time::Duration;
use tether_types::StreamMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Periodic `Ping` producer for one session.
///
/// Ticks every `period` from the session start, independent of upstream
/// activity. A full output channel skips the ping instead of queueing it
/// behind content. The task ends when stopped, dropped, or when the consumer
/// closes the channel.
pub(crate) struct Heartbeat {
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub(crate) fn spawn(tx: mpsc::Sender<StreamMessage>, start: Instant, period: Duration) -> Self {
        let task = tokio::spawn(
            async move {
                let mut ticker = time::interval_at(start + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    match tx.try_send(StreamMessage::Ping) {
                        Ok(()) => tracing::debug!("Heartbeat ping"),
                        Err(TrySendError::Full(_)) => {
                            tracing::debug!("Output channel full, skipping heartbeat")
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
            .in_current_span(),
        );

        Self { task: Some(task) }
    }

    /// Cancel the timer and wait until the task is gone.
    pub(crate) async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
