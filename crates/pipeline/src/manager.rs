//! PipelineManager: ordered interceptors per named point.
//!
//! Two operators:
//! - `mutate` registers `ctx -> ctx` interceptors run strictly in
//!   registration order, each output feeding the next.
//! - `wrap` registers decorators around a core operation. They are composed
//!   right-to-left into one callable: the last-registered wrapper sits
//!   innermost around the core, the first-registered outermost.
//!
//! A manager is built mutably (during extension reconciliation) and then
//! shared read-only behind an `Arc`, so swapping the whole interception set
//! is a single pointer replacement.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use swarmloop_core::{PipelineError, Result, StepContext};

use crate::point::PipelinePoint;

type MutatorFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<StepContext>> + Send + Sync>;
type WrapperFn =
    Arc<dyn Fn(StepContext, Next) -> BoxFuture<'static, Result<StepContext>> + Send + Sync>;
type ChainFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<StepContext>> + Send + Sync>;

/// The continuation handed to a wrapper.
///
/// Calling [`Next::run`] invokes the next wrapper (or the core operation).
/// A wrapper that never calls it skips the core entirely.
#[derive(Clone)]
pub struct Next {
    inner: ChainFn,
}

impl Next {
    pub async fn run(self, ctx: StepContext) -> Result<StepContext> {
        (self.inner)(ctx).await
    }
}

#[derive(Clone, Default)]
pub struct PipelineManager {
    mutators: HashMap<PipelinePoint, Vec<MutatorFn>>,
    wrappers: HashMap<PipelinePoint, Vec<WrapperFn>>,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context mutator at a mutator point.
    pub fn mutate<F, Fut>(&mut self, point: PipelinePoint, f: F) -> std::result::Result<(), PipelineError>
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepContext>> + Send + 'static,
    {
        if point.is_wrap_point() {
            return Err(PipelineError::WrongOperator {
                point: point.to_string(),
                operator: "mutate",
            });
        }
        let boxed: MutatorFn =
            Arc::new(move |ctx| -> BoxFuture<'static, Result<StepContext>> { Box::pin(f(ctx)) });
        self.mutators.entry(point).or_default().push(boxed);
        Ok(())
    }

    /// Register a wrapper at a wrap point.
    pub fn wrap<F, Fut>(&mut self, point: PipelinePoint, f: F) -> std::result::Result<(), PipelineError>
    where
        F: Fn(StepContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepContext>> + Send + 'static,
    {
        if !point.is_wrap_point() {
            return Err(PipelineError::WrongOperator {
                point: point.to_string(),
                operator: "wrap",
            });
        }
        let boxed: WrapperFn = Arc::new(move |ctx, next| -> BoxFuture<'static, Result<StepContext>> {
            Box::pin(f(ctx, next))
        });
        self.wrappers.entry(point).or_default().push(boxed);
        Ok(())
    }

    /// Number of interceptors registered at a point.
    pub fn count(&self, point: PipelinePoint) -> usize {
        self.mutators.get(&point).map_or(0, Vec::len) + self.wrappers.get(&point).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.values().all(Vec::is_empty) && self.wrappers.values().all(Vec::is_empty)
    }

    /// Run every mutator of `point` in registration order.
    pub async fn run_mutators(&self, point: PipelinePoint, mut ctx: StepContext) -> Result<StepContext> {
        let Some(list) = self.mutators.get(&point) else {
            return Ok(ctx);
        };
        debug!(point = %point, count = list.len(), "Running mutators");
        for mutator in list {
            ctx = mutator(ctx).await?;
        }
        Ok(ctx)
    }

    /// Run `core` inside the wrapper chain registered at `point`.
    pub async fn run_wrapped<F, Fut>(&self, point: PipelinePoint, ctx: StepContext, core: F) -> Result<StepContext>
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepContext>> + Send + 'static,
    {
        let mut chain: ChainFn =
            Arc::new(move |ctx| -> BoxFuture<'static, Result<StepContext>> { Box::pin(core(ctx)) });
        let wrappers = self.wrappers.get(&point).map(Vec::as_slice).unwrap_or_default();
        debug!(point = %point, count = wrappers.len(), "Running wrapped operation");

        for wrapper in wrappers.iter().rev() {
            let wrapper = Arc::clone(wrapper);
            let inner = chain;
            chain = Arc::new(move |ctx| -> BoxFuture<'static, Result<StepContext>> {
                wrapper(
                    ctx,
                    Next {
                        inner: Arc::clone(&inner),
                    },
                )
            });
        }
        chain(ctx).await
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = PipelinePoint::ALL
            .into_iter()
            .filter(|p| self.count(*p) > 0)
            .map(|p| (p.to_string(), self.count(p)))
            .collect();
        f.debug_struct("PipelineManager").field("registrations", &counts).finish()
    }
}
