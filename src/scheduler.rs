//! Virtual-user scheduling.
//!
//! Each virtual user is an independent tokio task that runs its iterations
//! and exits. The scheduler launches them according to the plan's
//! [`LaunchPolicy`](crate::launch_policy::LaunchPolicy), reaps tasks as they
//! finish so their memory is released promptly, and returns only after every
//! launched task has reached a terminal state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Duration, Instant};
use tracing::{error, info, warn};

use crate::client::TransactionClient;
use crate::metrics::{MetricsSnapshot, OutcomeMetrics};
use crate::plan::TestPlan;
use crate::workload::{run_virtual_user, WorkloadContext};

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub snapshot: MetricsSnapshot,
    /// Virtual users actually started
    pub launched: usize,
    /// Virtual users never started because the launch deadline passed
    pub skipped: usize,
    /// Virtual users whose task terminated abnormally
    pub aborted: usize,
    pub elapsed: Duration,
    /// Seed used for subject selection; rerun with it to reproduce the draws
    pub seed: u64,
}

/// Launches and awaits every virtual user of one run.
pub struct Scheduler {
    ctx: WorkloadContext,
}

impl Scheduler {
    pub fn new(
        plan: Arc<TestPlan>,
        client: Arc<dyn TransactionClient>,
        metrics: Arc<OutcomeMetrics>,
    ) -> Self {
        Self {
            ctx: WorkloadContext {
                plan,
                client,
                metrics,
            },
        }
    }

    /// Runs the plan to completion and returns the final snapshot.
    ///
    /// Never fails: per-iteration problems are classified and counted, and a
    /// virtual user that panics is logged. A plan with zero virtual users
    /// returns an all-zero snapshot immediately.
    pub async fn run(self) -> RunResult {
        let plan = self.ctx.plan.clone();
        let seed = plan.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut run_rng = StdRng::seed_from_u64(seed);

        let total = plan.vu_count;
        info!(
            vu_count = total,
            iterations_per_vu = plan.iterations_per_vu,
            launch_policy = plan.launch_policy.name(),
            max_skew_ms = plan.launch_policy.max_skew().as_millis() as u64,
            seed = seed,
            "Launching virtual users"
        );

        let start = Instant::now();
        let deadline = plan.launch_deadline.and_then(|d| start.checked_add(d));
        let mut tasks = JoinSet::new();
        let mut tally = Tally::default();

        for vu_id in 0..total {
            let launch_at = start + plan.launch_policy.start_offset(vu_id, total);

            if deadline.is_some_and(|d| launch_at >= d) {
                tally.skipped = total - vu_id;
                break;
            }

            // Wait for this unit's slot, reaping finished units meanwhile.
            while launch_at > Instant::now() {
                tokio::select! {
                    _ = time::sleep_until(launch_at) => break,
                    Some(res) = tasks.join_next() => tally.reap(res),
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                tally.skipped = total - vu_id;
                break;
            }

            let vu_rng = StdRng::seed_from_u64(run_rng.gen());
            tasks.spawn(run_virtual_user(self.ctx.clone(), vu_id, vu_rng));
            tally.launched += 1;

            while let Some(res) = tasks.try_join_next() {
                tally.reap(res);
            }
        }

        if tally.skipped > 0 {
            warn!(
                launched = tally.launched,
                skipped = tally.skipped,
                "Launch deadline reached, remaining virtual users were not started"
            );
        }

        while let Some(res) = tasks.join_next().await {
            tally.reap(res);
        }

        let snapshot = self.ctx.metrics.snapshot();
        let elapsed = start.elapsed();
        let expected = tally.launched as u64 * plan.iterations_per_vu as u64;
        if snapshot.total() != expected {
            // Only a virtual user that panicked mid-run skips its later iterations.
            warn!(
                expected = expected,
                recorded = snapshot.total(),
                aborted = tally.aborted,
                "Recorded outcomes differ from planned iterations"
            );
        }

        info!(
            launched = tally.launched,
            attempts = tally.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "All virtual users finished"
        );

        RunResult {
            snapshot,
            launched: tally.launched,
            skipped: tally.skipped,
            aborted: tally.aborted,
            elapsed,
            seed,
        }
    }
}

#[derive(Default)]
struct Tally {
    launched: usize,
    skipped: usize,
    aborted: usize,
    attempts: usize,
}

impl Tally {
    fn reap(&mut self, res: Result<usize, JoinError>) {
        match res {
            Ok(attempts) => self.attempts += attempts,
            Err(e) => {
                self.aborted += 1;
                error!(error = %e, "Virtual user terminated abnormally");
            }
        }
    }
}
