//! Execution-environment capability: where the probe runs and under which ids.

use crate::error::EnvironmentError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Environment: Send + Sync {
    async fn resolve_project_id(&self) -> Result<String, EnvironmentError>;

    async fn execution_region(&self) -> Result<String, EnvironmentError>;

    /// Opaque description of the runtime, copied into every run result.
    fn runtime_metadata(&self) -> serde_json::Value;

    /// Identifier of the uptime check this run belongs to.
    fn uptime_id(&self) -> String;

    /// Identifier of this particular execution.
    fn execution_id(&self) -> String;
}
