//! Query budgets
//!
//! Read operations check their budget between store round trips and stop
//! with [`GraphError::Cancelled`] once it is spent.

use crate::error::{GraphError, GraphResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional deadline
#[derive(Debug, Clone, Default)]
pub struct QueryBudget {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryBudget {
    /// A budget that never runs out unless cancelled
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Why the budget is spent, if it is
    pub fn exhausted(&self) -> Option<&'static str> {
        if self.token.is_cancelled() {
            Some("cancelled by caller")
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some("query timeout exceeded")
        } else {
            None
        }
    }

    pub fn check(&self, op: &str) -> GraphResult<()> {
        match self.exhausted() {
            Some(reason) => Err(GraphError::Cancelled {
                op: op.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_budget_passes() {
        let budget = QueryBudget::unlimited();
        assert!(budget.check("risk_assessment").is_ok());
    }

    #[test]
    fn test_cancelled_budget_fails() {
        let budget = QueryBudget::unlimited();
        let clone = budget.clone();
        clone.cancel();

        let err = budget.check("find_paths").unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("find_paths"));
    }

    #[test]
    fn test_deadline_expires() {
        let budget = QueryBudget::with_timeout(Some(Duration::ZERO));
        assert_eq!(budget.exhausted(), Some("query timeout exceeded"));

        let budget = QueryBudget::with_timeout(Some(Duration::from_secs(3600)));
        assert!(budget.exhausted().is_none());
    }
}
