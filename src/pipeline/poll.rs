//! Periodic re-runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{MetricRequest, Pipeline, PipelineOutput, RunOutcome};
use crate::filter::Selections;

/// Re-runs a set of metrics on a fixed interval until shut down.
///
/// The first run starts immediately. Outputs are delivered on the channel
/// passed to [`Poller::spawn`]; superseded runs deliver nothing.
pub struct Poller {
    pipeline: Arc<Pipeline>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        selections: Selections,
        requests: Vec<MetricRequest>,
        interval: Duration,
        sink: mpsc::UnboundedSender<PipelineOutput>,
    ) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);
        let worker = pipeline.clone();

        let handle = tokio::spawn(async move {
            // interval() rejects a zero period.
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), metrics = requests.len(), "poller started");

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }

                let outcomes = tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    outcomes = worker.run_many(&selections, &requests) => outcomes,
                };

                if *stopped.borrow() {
                    break;
                }
                for outcome in outcomes {
                    if let RunOutcome::Completed(output) = outcome {
                        if sink.send(output).is_err() {
                            tracing::info!("poller output closed");
                            return;
                        }
                    }
                }
            }
            tracing::info!("poller stopped");
        });

        Self {
            pipeline,
            shutdown,
            handle,
        }
    }

    /// Spawn with the configured polling interval.
    pub fn spawn_with_settings(
        pipeline: Arc<Pipeline>,
        selections: Selections,
        requests: Vec<MetricRequest>,
        sink: mpsc::UnboundedSender<PipelineOutput>,
    ) -> Self {
        let interval = pipeline.settings().polling.interval();
        Self::spawn(pipeline, selections, requests, interval, sink)
    }

    /// Stop polling. In-flight results are discarded and no further run is
    /// scheduled.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.pipeline.invalidate_runs();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
