//! Per workflow type executor tunables.
//!
//! The upstream capture and diff services advertise a fixed queries per
//! second budget, so the defaults here are deliberately conservative: a
//! small number of in-flight items per batch and minutes of pacing between
//! batches.

use chrono::TimeDelta;

use crate::workflow::{InvalidWorkflowType, WorkflowType};

/// Tunables for one workflow type's executor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of concurrently in-flight items per batch.
    pub parallelism: usize,
    /// Lower bound on the pacing delay inserted between batches.
    pub lower_bound: TimeDelta,
    /// Upper bound on the pacing delay inserted between batches.
    pub upper_bound: TimeDelta,
}

const SCREENSHOT: ExecutorConfig = ExecutorConfig {
    parallelism: 10,
    lower_bound: TimeDelta::minutes(2),
    upper_bound: TimeDelta::minutes(20),
};

const REPORT: ExecutorConfig = ExecutorConfig {
    parallelism: 4,
    lower_bound: TimeDelta::minutes(1),
    upper_bound: TimeDelta::minutes(10),
};

impl ExecutorConfig {
    pub fn with_parallelism(self, parallelism: usize) -> Self {
        Self {
            parallelism,
            ..self
        }
    }

    pub fn with_bounds(self, lower_bound: TimeDelta, upper_bound: TimeDelta) -> Self {
        Self {
            lower_bound,
            upper_bound,
            ..self
        }
    }
}

impl WorkflowType {
    /// The tuned executor configuration for this workflow type.
    pub fn executor_config(&self) -> ExecutorConfig {
        match self {
            Self::Screenshot => SCREENSHOT,
            Self::Report => REPORT,
        }
    }
}

/// Resolves the executor configuration for a workflow type given by name,
/// e.g. from an API request or a schedule definition.
pub fn executor_config(workflow_type: &str) -> Result<ExecutorConfig, InvalidWorkflowType> {
    let workflow_type: WorkflowType = workflow_type.parse()?;
    Ok(workflow_type.executor_config())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn known_types_resolve_to_their_tuned_config() {
        let config = executor_config("screenshot").unwrap();
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.lower_bound, TimeDelta::minutes(2));
        assert_eq!(config.upper_bound, TimeDelta::minutes(20));

        let config = executor_config("report").unwrap();
        assert_eq!(config.parallelism, 4);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert_matches!(executor_config("invoice"), Err(InvalidWorkflowType(_)));
    }

    #[test]
    fn overrides_replace_only_the_named_fields() {
        let config = WorkflowType::Screenshot
            .executor_config()
            .with_parallelism(2)
            .with_bounds(TimeDelta::seconds(1), TimeDelta::seconds(2));

        assert_eq!(config.parallelism, 2);
        assert_eq!(config.lower_bound, TimeDelta::seconds(1));
        assert_eq!(config.upper_bound, TimeDelta::seconds(2));
    }
}
