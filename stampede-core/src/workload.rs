use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stampede_value::Context;

use crate::error::IterationError;

pub type StepFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

type PlainFn = dyn Fn() -> StepFuture<'static> + Send + Sync;
type ContextFn = dyn for<'a> Fn(&'a mut Context) -> StepFuture<'a> + Send + Sync;

#[derive(Clone)]
pub enum StepAction {
    Plain(Arc<PlainFn>),
    /// Borrows the iteration's live context, so a step can read what an earlier step wrote.
    WithContext(Arc<ContextFn>),
}

/// A named unit of work.
#[derive(Clone)]
pub struct WorkloadStep {
    name: String,
    description: String,
    action: StepAction,
}

impl WorkloadStep {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            action: StepAction::Plain(Arc::new(move || -> StepFuture<'static> { Box::pin(f()) })),
        }
    }

    pub fn with_context<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> StepFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            action: StepAction::WithContext(Arc::new(f)),
        }
    }

    /// Context-aware step whose body never awaits.
    pub fn with_context_sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&mut Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_context(name, description, move |ctx| {
            let out = f(ctx);
            Box::pin(std::future::ready(out))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub async fn run(&self, ctx: &mut Context) -> anyhow::Result<()> {
        match &self.action {
            StepAction::Plain(f) => f().await,
            StepAction::WithContext(f) => f(ctx).await,
        }
    }
}

impl fmt::Debug for WorkloadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.action {
            StepAction::Plain(_) => "plain",
            StepAction::WithContext(_) => "with_context",
        };
        f.debug_struct("WorkloadStep")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("action", &kind)
            .finish()
    }
}

/// Step name to behaviour lookup.
///
/// Built once at startup and shared read-only (`Arc<WorkloadRegistry>`) by every worker.
#[derive(Debug, Clone, Default)]
pub struct WorkloadRegistry {
    steps: Vec<WorkloadStep>,
    index: HashMap<String, usize>,
}

impl WorkloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `step`. A step with the same name is replaced but keeps its position.
    pub fn add_step(&mut self, step: WorkloadStep) {
        match self.index.get(step.name()) {
            Some(&idx) => self.steps[idx] = step,
            None => {
                self.index.insert(step.name().to_string(), self.steps.len());
                self.steps.push(step);
            }
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: WorkloadStep) -> Self {
        self.add_step(step);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkloadStep> {
        self.index.get(name).map(|&idx| &self.steps[idx])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Registered steps in registration order.
    pub fn describe(&self) -> impl Iterator<Item = &WorkloadStep> {
        self.steps.iter()
    }

    /// Splits `command_list` on `,` and looks every trimmed name up, keeping order.
    pub fn resolve(&self, command_list: &str) -> Result<Vec<&WorkloadStep>, IterationError> {
        command_list
            .split(',')
            .map(str::trim)
            .map(|name| {
                self.get(name).ok_or_else(|| IterationError::UnknownStep {
                    name: name.to_string(),
                })
            })
            .collect()
    }
}
