//! Stage definitions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{Result, RunContext};
use tokio_util::sync::CancellationToken;

/// A unit of work run by the [`crate::StageRunner`].
///
/// Actions receive the run's immutable context and the run's cancellation
/// token. Long waits inside an action should observe `cancel`.
#[async_trait]
pub trait StageAction: Send + Sync {
    async fn execute(&self, ctx: &RunContext, cancel: &CancellationToken) -> Result<()>;
}

/// A named, ordered step of a pipeline.
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    pub action: Arc<dyn StageAction>,
    /// Failure of a critical stage aborts the rest of the sequence.
    pub critical: bool,
    /// Upper bound on the action's run time.
    pub timeout: Option<Duration>,
}

impl Stage {
    /// A critical stage with no timeout.
    pub fn new(name: impl Into<String>, action: impl StageAction + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            critical: true,
            timeout: None,
        }
    }

    /// A stage whose action is an async closure over a cloned context.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(name, FnAction(f))
    }

    /// Record failures but keep going.
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> StageAction for FnAction<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<()> {
        (self.0)(ctx.clone()).await
    }
}
