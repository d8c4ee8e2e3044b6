//! The immutable test plan shared by every virtual user.

use thiserror::Error;
use tokio::time::Duration;

use crate::launch_policy::LaunchPolicy;

pub const DEFAULT_TARGET_URL: &str = "http://localhost:8080/transaction";
pub const DEFAULT_VU_COUNT: usize = 15_000;
pub const DEFAULT_ITERATIONS_PER_VU: usize = 1;
pub const DEFAULT_WALLET_ID: &str = "a97de01f-caea-40be-ba2b-4d39e75fbb1d";
pub const DEFAULT_USER_IDS: [&str; 3] = [
    "f333ce48-6877-4967-9b12-7e62c3f9acc3",
    "e67cedc9-2c20-4768-88a1-954929c766a4",
    "60f88754-9b3b-4b58-a723-713cf6698fff",
];
pub const DEFAULT_AMOUNT: i64 = 1;

/// Reasons a plan is rejected before any virtual user is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Target URL '{0}' must start with http:// or https://")]
    InvalidTargetUrl(String),

    #[error("VU count must be greater than 0")]
    ZeroVirtualUsers,

    #[error("Iterations per VU must be greater than 0")]
    ZeroIterations,

    #[error("Subject pool (user IDs) must not be empty")]
    EmptySubjectPool,

    #[error("Subject pool contains a blank user ID at position {0}")]
    BlankSubject(usize),

    #[error("Resource identifier (wallet ID) must not be empty")]
    EmptyResourceId,
}

/// Everything a run needs to know. Built once, then shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPlan {
    pub target_url: String,
    pub vu_count: usize,
    pub iterations_per_vu: usize,
    /// Candidate user IDs, drawn uniformly with replacement.
    pub user_ids: Vec<String>,
    /// Fixed wallet (event) ID sent with every transaction.
    pub wallet_id: String,
    pub amount: i64,
    pub launch_policy: LaunchPolicy,
    /// Once elapsed, no further virtual users are launched.
    pub launch_deadline: Option<Duration>,
    /// Run seed for subject selection; generated and logged when absent.
    pub seed: Option<u64>,
}

impl Default for TestPlan {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            vu_count: DEFAULT_VU_COUNT,
            iterations_per_vu: DEFAULT_ITERATIONS_PER_VU,
            user_ids: DEFAULT_USER_IDS.iter().map(|s| s.to_string()).collect(),
            wallet_id: DEFAULT_WALLET_ID.to_string(),
            amount: DEFAULT_AMOUNT,
            launch_policy: LaunchPolicy::Burst,
            launch_deadline: None,
            seed: None,
        }
    }
}

impl TestPlan {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            ..Self::default()
        }
    }

    pub fn with_vu_count(mut self, vu_count: usize) -> Self {
        self.vu_count = vu_count;
        self
    }

    pub fn with_iterations_per_vu(mut self, iterations: usize) -> Self {
        self.iterations_per_vu = iterations;
        self
    }

    pub fn with_user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = user_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_wallet_id(mut self, wallet_id: impl Into<String>) -> Self {
        self.wallet_id = wallet_id.into();
        self
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_launch_policy(mut self, policy: LaunchPolicy) -> Self {
        self.launch_policy = policy;
        self
    }

    pub fn with_launch_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.launch_deadline = deadline;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Total number of attempts a complete run makes.
    pub fn total_iterations(&self) -> u64 {
        self.vu_count as u64 * self.iterations_per_vu as u64
    }

    /// Checks the plan. Returns the first problem found.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.target_url.starts_with("http://") || self.target_url.starts_with("https://")) {
            return Err(PlanError::InvalidTargetUrl(self.target_url.clone()));
        }
        if self.vu_count == 0 {
            return Err(PlanError::ZeroVirtualUsers);
        }
        if self.iterations_per_vu == 0 {
            return Err(PlanError::ZeroIterations);
        }
        if self.user_ids.is_empty() {
            return Err(PlanError::EmptySubjectPool);
        }
        if let Some(pos) = self.user_ids.iter().position(|id| id.trim().is_empty()) {
            return Err(PlanError::BlankSubject(pos));
        }
        if self.wallet_id.trim().is_empty() {
            return Err(PlanError::EmptyResourceId);
        }
        Ok(())
    }
}
