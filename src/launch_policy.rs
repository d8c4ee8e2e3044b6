use tokio::time::Duration;

/// How virtual users arrive over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchPolicy {
    /// Every virtual user is launched at once.
    /// Maximum simultaneous concurrency; the flash-sale scenario.
    #[default]
    Burst,

    /// Linear arrival spread over `duration`.
    /// Virtual user `i` of `n` starts at `i * duration / n`, so the first starts
    /// immediately and startup skew never exceeds `duration`.
    Ramp { duration: Duration },
}

impl LaunchPolicy {
    /// Calculates when virtual user `index` should start, relative to run start.
    ///
    /// # Arguments
    /// * `index` - Zero-based virtual-user index
    /// * `total` - Total number of virtual users in the run
    pub fn start_offset(&self, index: usize, total: usize) -> Duration {
        match self {
            LaunchPolicy::Burst => Duration::ZERO,
            LaunchPolicy::Ramp { duration } => {
                if total == 0 || duration.is_zero() {
                    return Duration::ZERO;
                }
                let index = index.min(total) as u128;
                let nanos = duration.as_nanos() * index / total as u128;
                Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
            }
        }
    }

    /// Upper bound on the spread between the first and last launch.
    pub fn max_skew(&self) -> Duration {
        match self {
            LaunchPolicy::Burst => Duration::ZERO,
            LaunchPolicy::Ramp { duration } => *duration,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LaunchPolicy::Burst => "burst",
            LaunchPolicy::Ramp { .. } => "ramp",
        }
    }
}
