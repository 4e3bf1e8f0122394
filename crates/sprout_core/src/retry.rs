//! Routing predicates for the two conditional edges of the graph.

use serde::{Deserialize, Serialize};

use crate::stage::StageId;
use crate::state::{FailureKind, PipelineState};

/// Default bound on failing builds per run.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Decides where the graph goes after Builder and after Fixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// When false, a fix for an internal stage failure never triggers a rebuild.
    pub retry_internal_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_internal_failures: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn retry_internal_failures(mut self, retry: bool) -> Self {
        self.retry_internal_failures = retry;
        self
    }

    /// Fixer when the build left an error or no URL, otherwise deploy.
    pub fn after_build(&self, state: &PipelineState) -> StageId {
        if state.last_error.is_some() || state.run_url.is_none() {
            StageId::Fix
        } else {
            StageId::Deploy
        }
    }

    /// Builder when [`should_retry`](Self::should_retry) holds, otherwise deploy.
    pub fn after_fix(&self, state: &PipelineState) -> StageId {
        if self.should_retry(state) {
            StageId::Build
        } else {
            StageId::Deploy
        }
    }

    /// A fix was applied, there is still no URL and the retry budget is not spent.
    pub fn should_retry(&self, state: &PipelineState) -> bool {
        if !self.retry_internal_failures
            && state
                .previous_error
                .as_ref()
                .is_some_and(|e| e.kind == FailureKind::StageInternalFailure)
        {
            return false;
        }
        state.fixer_applied_fixes && state.run_url.is_none() && state.build_retry_count < self.max_retries
    }

    /// Most Builder invocations a single run can make.
    pub fn max_build_visits(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StageError;

    fn failed_build(retries: u32) -> PipelineState {
        let mut state = PipelineState::new("s", "p");
        state.last_error = Some(StageError::external("npm ERR!"));
        state.build_retry_count = retries;
        state
    }

    #[test]
    fn test_after_build() {
        let policy = RetryPolicy::default();
        let mut state = failed_build(1);
        assert_eq!(policy.after_build(&state), StageId::Fix);

        // Healthy but with a stale error still routes to the fixer.
        state.run_url = Some("http://localhost:3000".into());
        assert_eq!(policy.after_build(&state), StageId::Fix);

        state.last_error = None;
        assert_eq!(policy.after_build(&state), StageId::Deploy);

        state.run_url = None;
        assert_eq!(policy.after_build(&state), StageId::Fix);
    }

    #[test]
    fn test_should_retry_requires_fix_and_budget() {
        let policy = RetryPolicy::default();
        let mut state = failed_build(1);
        assert!(!policy.should_retry(&state));

        state.fixer_applied_fixes = true;
        assert!(policy.should_retry(&state));
        assert_eq!(policy.after_fix(&state), StageId::Build);

        state.build_retry_count = 3;
        assert!(!policy.should_retry(&state));
        assert_eq!(policy.after_fix(&state), StageId::Deploy);

        state.build_retry_count = 0;
        state.run_url = Some("http://localhost:3000".into());
        assert!(!policy.should_retry(&state));
    }

    #[test]
    fn test_internal_failures_can_be_excluded() {
        let mut state = failed_build(1);
        state.fixer_applied_fixes = true;
        state.previous_error = Some(StageError::internal("Invalid repo_path"));

        assert!(RetryPolicy::default().should_retry(&state));
        assert!(!RetryPolicy::default()
            .retry_internal_failures(false)
            .should_retry(&state));
    }

    #[test]
    fn test_max_build_visits() {
        assert_eq!(RetryPolicy::default().max_build_visits(), 4);
        assert_eq!(RetryPolicy::new(0).max_build_visits(), 1);
    }
}
