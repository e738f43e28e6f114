// Supervised run loop around the grid engine

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::ExchangeGateway;
use crate::config::RunnerConfig;
use crate::core::grid_engine::{CycleOutcome, GridEngine, ResetReason};
use crate::error::ResetPolicy;

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub errors: u64,
    pub resets: u64,
}

/// Runs engine cycles until cancelled. This is the single place where cycle
/// errors are caught; the process never exits on a recoverable error.
pub struct GridRunner<E: ExchangeGateway> {
    engine: GridEngine<E>,
    token: CancellationToken,
    poll_interval: Duration,
    error_delay: Duration,
    reset_policy: ResetPolicy,
}

impl<E: ExchangeGateway> GridRunner<E> {
    pub fn new(engine: GridEngine<E>, config: &RunnerConfig) -> Self {
        let token = engine.cancellation_token();
        Self {
            engine,
            token,
            poll_interval: config.poll_interval(),
            error_delay: config.error_delay(),
            reset_policy: config.reset_on_error,
        }
    }

    /// Token that stops the loop; shared with the engine
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn engine(&self) -> &GridEngine<E> {
        &self.engine
    }

    pub fn into_engine(self) -> GridEngine<E> {
        self.engine
    }

    pub async fn run(&mut self) -> RunStats {
        let mut stats = RunStats::default();
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            reset_on_error = ?self.reset_policy,
            "🚀 Grid runner started"
        );

        loop {
            if self.token.is_cancelled() {
                break;
            }

            stats.cycles += 1;
            let delay = match self.engine.run_cycle().await {
                Ok(CycleOutcome::Interrupted) => break,
                Ok(outcome) => {
                    if let CycleOutcome::Reset(reason) = outcome {
                        info!(%reason, "Grid will be rebuilt next cycle");
                        stats.resets += 1;
                    }
                    self.poll_interval
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(category = e.category(), error = %e, "❌ Cycle failed");

                    if e.triggers_reset(self.reset_policy) {
                        match self.engine.force_reset(ResetReason::Error).await {
                            Ok(()) => stats.resets += 1,
                            Err(reset_err) => {
                                warn!(error = %reset_err, "Forced reset failed, will retry next cycle");
                            }
                        }
                    }
                    self.error_delay
                }
            };

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(
            cycles = stats.cycles,
            errors = stats.errors,
            resets = stats.resets,
            "👋 Grid runner stopped, resting orders left in place"
        );
        stats
    }
}
