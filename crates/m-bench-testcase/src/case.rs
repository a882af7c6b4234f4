//! ---
//! mb_section: "05-test-case-engine"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Test case model, step polling engine, and result reporting."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::time::Duration;

use m_bench_common::config::TestCaseConfig;
use m_bench_script::ScriptContext;

use crate::StepOutcome;

type StepFn<S> = Box<dyn Fn(&mut S, &ScriptContext) -> StepOutcome + Send + Sync>;
type HookFn<S> = Box<dyn Fn(&mut S, &ScriptContext) -> Result<(), String> + Send + Sync>;
type StateFactory<S> = Box<dyn Fn() -> S + Send + Sync>;

/// A named step: a synchronous check over the case state.
pub struct StepDef<S> {
    /// Name shown in reports and logs.
    pub label: String,
    pub(crate) body: StepFn<S>,
}

impl<S> StepDef<S> {
    /// Build a step from a label and its body.
    pub fn new(
        label: impl Into<String>,
        body: impl Fn(&mut S, &ScriptContext) -> StepOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            body: Box::new(body),
        }
    }
}

/// How the engine reacts to a failed step.
#[derive(Debug, Clone, Copy)]
pub struct CasePolicy {
    /// Skip the remaining steps once a step fails. Continuing past a failure
    /// is opt-in; dependent steps usually cannot produce meaningful verdicts.
    pub abort_on_failure: bool,
}

impl Default for CasePolicy {
    fn default() -> Self {
        Self {
            abort_on_failure: true,
        }
    }
}

/// Per-case polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct CaseOptions {
    /// Pause between re-invocations of an `InProgress` step.
    pub step_interval: Duration,
    /// Invocation budget per step; exceeding it fails the step.
    pub max_attempts: u32,
}

impl Default for CaseOptions {
    fn default() -> Self {
        Self::from_config(&TestCaseConfig::default())
    }
}

impl CaseOptions {
    /// Take the polling parameters from the engine configuration.
    pub fn from_config(config: &TestCaseConfig) -> Self {
        Self {
            step_interval: config.step_interval,
            max_attempts: config.max_attempts,
        }
    }
}

/// An ordered list of steps over case-owned state `S`.
///
/// The state is built fresh from the factory at every run start, so repeated
/// runs of the same case never observe each other's residue. Optional
/// before/after hooks bracket the steps; the after hook runs however the
/// case ends.
pub struct TestCase<S> {
    /// Case name shown in reports and the run registry.
    pub name: String,
    pub(crate) state_factory: StateFactory<S>,
    pub(crate) steps: Vec<StepDef<S>>,
    pub(crate) before: Option<HookFn<S>>,
    pub(crate) after: Option<HookFn<S>>,
    /// Failure handling policy.
    pub policy: CasePolicy,
    /// Polling parameters.
    pub options: CaseOptions,
}

impl<S> TestCase<S> {
    /// Create an empty case over state built by `state_factory` at each run.
    pub fn new(name: impl Into<String>, state_factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            state_factory: Box::new(state_factory),
            steps: Vec::new(),
            before: None,
            after: None,
            policy: CasePolicy::default(),
            options: CaseOptions::default(),
        }
    }

    /// Append a step. Steps run in insertion order.
    pub fn step(
        mut self,
        label: impl Into<String>,
        body: impl Fn(&mut S, &ScriptContext) -> StepOutcome + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(StepDef::new(label, body));
        self
    }

    /// Hook run once before the first step; failure aborts the case.
    pub fn before(
        mut self,
        hook: impl Fn(&mut S, &ScriptContext) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    /// Hook run once after the last step, however the case ends. Its failure
    /// is reported but never changes recorded step verdicts.
    pub fn after(
        mut self,
        hook: impl Fn(&mut S, &ScriptContext) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Box::new(hook));
        self
    }

    /// Override the failure handling policy.
    pub fn with_policy(mut self, policy: CasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the polling parameters.
    pub fn with_options(mut self, options: CaseOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of defined steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl<S> std::fmt::Debug for TestCase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| &s.label).collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("options", &self.options)
            .finish()
    }
}
