//! Final run report.

use serde::Serialize;
use std::fmt;

use crate::metrics::{ErrorBuckets, MetricsSnapshot};
use crate::outcome::OutcomeCategory;
use crate::scheduler::RunResult;

/// Serializable summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub launched: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub elapsed_ms: u64,
    pub attempts: u64,
    pub outcomes: MetricsSnapshot,
    pub metrics: ErrorBuckets,
}

impl From<&RunResult> for RunReport {
    fn from(result: &RunResult) -> Self {
        Self {
            seed: result.seed,
            launched: result.launched,
            skipped: result.skipped,
            aborted: result.aborted,
            elapsed_ms: result.elapsed.as_millis() as u64,
            attempts: result.snapshot.total(),
            outcomes: result.snapshot,
            metrics: result.snapshot.buckets(),
        }
    }
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Share of attempts that landed in `category`, in percent.
    pub fn percentage(&self, category: OutcomeCategory) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.outcomes.get(category) as f64 * 100.0 / self.attempts as f64
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Virtual users: {} launched, {} skipped, {} aborted",
            self.launched, self.skipped, self.aborted
        )?;
        writeln!(f, "Attempts: {} in {} ms", self.attempts, self.elapsed_ms)?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f)?;
        for (category, count) in self.outcomes.iter() {
            writeln!(
                f,
                "  {:<20} {:>8}  ({:>5.1}%)  {}",
                category.name(),
                count,
                self.percentage(category),
                category.description()
            )?;
        }
        writeln!(f)?;
        writeln!(f, "  success              {:>8}", self.metrics.success)?;
        writeln!(f, "  errors_sold_out      {:>8}", self.metrics.errors_sold_out)?;
        writeln!(
            f,
            "  errors_db_connection {:>8}",
            self.metrics.errors_db_connection
        )?;
        write!(f, "  errors_other         {:>8}", self.metrics.errors_other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::OutcomeMetrics;
    use std::time::Duration;

    fn result() -> RunResult {
        let metrics = OutcomeMetrics::new("report_test").unwrap();
        for _ in 0..6 {
            metrics.increment(OutcomeCategory::Success);
        }
        metrics.increment(OutcomeCategory::SoldOut);
        metrics.increment(OutcomeCategory::SoldOut);
        metrics.increment(OutcomeCategory::TransportFailure);
        metrics.increment(OutcomeCategory::Other);

        RunResult {
            snapshot: metrics.snapshot(),
            launched: 10,
            skipped: 0,
            aborted: 0,
            elapsed: Duration::from_millis(1234),
            seed: 99,
        }
    }

    #[test]
    fn report_counts_and_buckets() {
        let report = RunReport::from(&result());
        assert_eq!(report.attempts, 10);
        assert_eq!(report.elapsed_ms, 1234);
        assert_eq!(report.metrics.success, 6);
        assert_eq!(report.metrics.errors_sold_out, 2);
        assert_eq!(report.metrics.errors_db_connection, 0);
        assert_eq!(report.metrics.errors_other, 2);
        assert!((report.percentage(OutcomeCategory::Success) - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn json_uses_public_metric_names() {
        let json: serde_json::Value =
            serde_json::from_str(&RunReport::from(&result()).to_json().unwrap()).unwrap();
        assert_eq!(json["metrics"]["errors_sold_out"], 2);
        assert_eq!(json["metrics"]["errors_db_connection"], 0);
        assert_eq!(json["metrics"]["errors_other"], 2);
        assert_eq!(json["outcomes"]["TransportFailure"], 1);
        assert_eq!(json["seed"], 99);
    }

    #[test]
    fn display_lists_every_category() {
        let text = RunReport::from(&result()).to_string();
        for category in OutcomeCategory::ALL {
            assert!(text.contains(category.name()));
        }
        assert!(text.contains("errors_db_connection"));
    }

    #[test]
    fn empty_run_has_zero_percentages() {
        let report = RunReport::from(&RunResult {
            snapshot: MetricsSnapshot::default(),
            launched: 0,
            skipped: 0,
            aborted: 0,
            elapsed: Duration::ZERO,
            seed: 0,
        });
        assert_eq!(report.percentage(OutcomeCategory::Success), 0.0);
    }
}
