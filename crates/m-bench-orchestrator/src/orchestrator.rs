//! ---
//! mb_section: "06-orchestrator"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Run registry, inbound routing, and lifecycle supervision."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use m_bench_common::config::EngineConfig;
use m_bench_messaging::{pattern, Message, MessageBuffer, QosLevel, Transport};
use m_bench_script::{
    MessageHandler, RunOptions, Script, ScriptContext, ScriptHost, ScriptOutcome,
};
use m_bench_testcase::{CaseReport, CaseStatus, StepEngine, TestCase};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::OrchestratorError;

/// Registry view of one run. Every run passes through `Running` to exactly
/// one `Finished` state and never leaves it.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// The run's task has not reached its terminal outcome yet.
    Running,
    /// The run ended with this outcome; the status never changes again.
    Finished(ScriptOutcome),
}

struct RunEntry {
    name: String,
    ctx: Arc<ScriptContext>,
    handle: Option<JoinHandle<ScriptOutcome>>,
    status: RunStatus,
}

struct HandlerEntry {
    pattern: String,
    handler: Arc<dyn MessageHandler>,
}

/// Owns the shared buffer, the transport, the run registry, and the inbound
/// routing table.
pub struct Orchestrator {
    config: EngineConfig,
    buffer: Arc<MessageBuffer>,
    transport: Arc<dyn Transport>,
    runs: Mutex<HashMap<Uuid, RunEntry>>,
    handlers: RwLock<Vec<HandlerEntry>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Build an orchestrator over the given transport, with a buffer sized
    /// from the configuration.
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let buffer = Arc::new(MessageBuffer::with_config(&config.buffer));
        let (shutdown_tx, _) = broadcast::channel(4);
        Arc::new(Self {
            config,
            buffer,
            transport,
            runs: Mutex::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            shutdown_tx,
        })
    }

    /// Build an orchestrator wired to a [`crate::LoopbackTransport`] with the
    /// inbound pump already running.
    pub fn with_loopback(config: EngineConfig) -> (Arc<Self>, JoinHandle<()>) {
        let (transport, rx) = crate::LoopbackTransport::new();
        let orchestrator = Self::new(config, Arc::new(transport));
        let pump = orchestrator.start_pump(rx);
        (orchestrator, pump)
    }

    /// Shared message buffer all runs record into and query from.
    pub fn buffer(&self) -> &Arc<MessageBuffer> {
        &self.buffer
    }

    /// Configuration this orchestrator was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn new_context(&self, name: &str) -> Arc<ScriptContext> {
        ScriptContext::new(
            name,
            self.config.script.default_timeout,
            self.buffer.clone(),
            self.transport.clone(),
        )
    }

    /// Start a script on its own cancellable unit; returns its run id
    /// immediately.
    pub fn spawn_script(
        self: &Arc<Self>,
        name: &str,
        script: Arc<dyn Script>,
        options: RunOptions,
    ) -> Uuid {
        let ctx = self.new_context(name);
        let id = ctx.id();
        self.register(&ctx);
        let orchestrator = self.clone();
        let run_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let outcome = ScriptHost::run(script, run_ctx, options).await;
            orchestrator.finish(id, outcome.clone());
            outcome
        });
        self.store_handle(id, handle);
        id
    }

    /// Run a script to its outcome, registering it like any other run.
    pub async fn run_script(
        self: &Arc<Self>,
        name: &str,
        script: Arc<dyn Script>,
        options: RunOptions,
    ) -> Result<ScriptOutcome, OrchestratorError> {
        let id = self.spawn_script(name, script, options);
        self.wait(id).await
    }

    /// Start a test case on its own cancellable unit. The case verdict is
    /// recorded into the registry alongside script outcomes, and the run
    /// task is stored like any other so [`Self::wait`] and
    /// [`Self::shutdown`] join it uniformly. The detailed report arrives on
    /// the returned channel once the case is over.
    pub fn spawn_test_case<S: Send + 'static>(
        self: &Arc<Self>,
        case: TestCase<S>,
    ) -> (Uuid, oneshot::Receiver<CaseReport>) {
        let ctx = self.new_context(&case.name);
        let id = ctx.id();
        self.register(&ctx);
        let (report_tx, report_rx) = oneshot::channel();
        let orchestrator = self.clone();
        let run_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let report = StepEngine::run(&case, &run_ctx).await;
            let outcome = case_outcome(report.verdict);
            orchestrator.finish(id, outcome.clone());
            let _ = report_tx.send(report);
            outcome
        });
        self.store_handle(id, handle);
        (id, report_rx)
    }

    /// Run a test case to completion and return its report.
    pub async fn run_test_case<S: Send + 'static>(self: &Arc<Self>, case: TestCase<S>) -> CaseReport {
        let (id, report_rx) = self.spawn_test_case(case);
        match report_rx.await {
            Ok(report) => report,
            Err(err) => {
                // The sender dropped without a report: the case task died.
                warn!(run = %id, error = %err, "test case task failed");
                self.finish(id, ScriptOutcome::Failed(err.to_string()));
                CaseReport {
                    case_name: String::new(),
                    verdict: CaseStatus::Failed,
                    started_at: chrono::Utc::now(),
                    finished_at: chrono::Utc::now(),
                    steps: Vec::new(),
                    after_hook_error: Some(err.to_string()),
                }
            }
        }
    }

    fn register(&self, ctx: &Arc<ScriptContext>) {
        debug!(run = %ctx.id(), name = %ctx.name(), "run registered");
        self.runs.lock().insert(
            ctx.id(),
            RunEntry {
                name: ctx.name().to_string(),
                ctx: ctx.clone(),
                handle: None,
                status: RunStatus::Running,
            },
        );
    }

    fn store_handle(&self, id: Uuid, handle: JoinHandle<ScriptOutcome>) {
        if let Some(entry) = self.runs.lock().get_mut(&id) {
            entry.handle = Some(handle);
        }
    }

    fn finish(&self, id: Uuid, outcome: ScriptOutcome) {
        let mut runs = self.runs.lock();
        if let Some(entry) = runs.get_mut(&id) {
            if matches!(entry.status, RunStatus::Running) {
                entry.status = RunStatus::Finished(outcome);
            }
        }
    }

    /// Wait for a spawned run's outcome. Each run can be waited on once;
    /// later callers read [`Self::status`].
    pub async fn wait(&self, id: Uuid) -> Result<ScriptOutcome, OrchestratorError> {
        let handle = {
            let mut runs = self.runs.lock();
            let entry = runs.get_mut(&id).ok_or(OrchestratorError::UnknownRun(id))?;
            match entry.handle.take() {
                Some(handle) => handle,
                None => {
                    return match &entry.status {
                        RunStatus::Finished(outcome) => Ok(outcome.clone()),
                        RunStatus::Running => Err(OrchestratorError::AlreadyWaited(id)),
                    }
                }
            }
        };
        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let outcome = ScriptOutcome::Failed(err.to_string());
                self.finish(id, outcome.clone());
                Ok(outcome)
            }
        }
    }

    /// Current registry status; `None` for an unknown id.
    pub fn status(&self, id: Uuid) -> Option<RunStatus> {
        self.runs.lock().get(&id).map(|entry| entry.status.clone())
    }

    /// Request a cooperative stop of one run. Returns false for unknown ids.
    pub fn cancel(&self, id: Uuid) -> bool {
        let runs = self.runs.lock();
        match runs.get(&id) {
            Some(entry) => {
                info!(run = %id, script = %entry.name, "cancelling run");
                entry.ctx.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered run, stop the inbound pump, and join all run
    /// tasks. Outcomes of interrupted runs are recorded as usual.
    pub async fn shutdown(&self) {
        info!("orchestrator shutting down");
        let _ = self.shutdown_tx.send(());
        let handles: Vec<(Uuid, JoinHandle<ScriptOutcome>)> = {
            let mut runs = self.runs.lock();
            runs.iter_mut()
                .map(|(id, entry)| {
                    entry.ctx.cancel();
                    (*id, entry.handle.take())
                })
                .filter_map(|(id, handle)| handle.map(|h| (id, h)))
                .collect()
        };
        for (id, handle) in handles {
            if let Err(err) = handle.await {
                warn!(run = %id, error = %err, "run task failed during shutdown");
            }
        }
    }

    /// Attach a handler to a topic filter: registers the buffer pattern and
    /// subscribes through the transport. Inbound messages matching the
    /// filter are routed to the handler.
    pub fn attach_handler(
        &self,
        filter: &str,
        qos: QosLevel,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), OrchestratorError> {
        pattern::validate(filter).map_err(OrchestratorError::InvalidPattern)?;
        self.buffer.register(filter);
        self.transport.subscribe(filter, qos)?;
        self.handlers.write().push(HandlerEntry {
            pattern: filter.to_string(),
            handler: handler.clone(),
        });
        info!(%filter, "handler attached");
        Ok(())
    }

    /// Route one inbound message: matching handlers run through the script
    /// host under the standard timeout contract, their publishes go out
    /// through the transport, and a returned replacement substitutes the
    /// message recorded into the buffer. A handler fault or timeout is
    /// reported but never suppresses the recording.
    pub async fn route_inbound(&self, message: Message) -> Arc<Message> {
        let matching: Vec<(String, Arc<dyn MessageHandler>)> = {
            let handlers = self.handlers.read();
            handlers
                .iter()
                .filter(|entry| pattern::matches(&entry.pattern, &message.topic))
                .map(|entry| (entry.pattern.clone(), entry.handler.clone()))
                .collect()
        };

        let mut current = Arc::new(message);
        for (filter, handler) in matching {
            let ctx = self.new_context(&format!("handler:{filter}"));
            let (outcome, action) =
                ScriptHost::run_handler(handler, ctx, current.clone()).await;
            match action {
                Some(action) => {
                    for outbound in action.publishes {
                        if let Err(err) = self.transport.publish(&outbound) {
                            warn!(topic = %outbound.topic, error = %err, "handler publish failed");
                        }
                    }
                    if let Some(replacement) = action.replacement {
                        current = Arc::new(replacement);
                    }
                }
                None => {
                    warn!(%filter, topic = %current.topic, ?outcome, "handler did not complete");
                }
            }
        }

        self.buffer.record(&current);
        current
    }

    /// Spawn the select loop draining an inbound channel into
    /// [`Self::route_inbound`]; stops on shutdown or channel close.
    pub fn start_pump(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    inbound = rx.recv() => match inbound {
                        Some(message) => {
                            orchestrator.route_inbound(message).await;
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("inbound pump stopped");
        })
    }
}

fn case_outcome(verdict: CaseStatus) -> ScriptOutcome {
    match verdict {
        CaseStatus::Passed => ScriptOutcome::Completed { success: true },
        CaseStatus::Failed => ScriptOutcome::Completed { success: false },
        CaseStatus::Skipped => ScriptOutcome::Cancelled,
        // A spawned case is Running until the engine returns, so these two
        // never reach the registry.
        CaseStatus::NotStarted | CaseStatus::Running => ScriptOutcome::Completed { success: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use m_bench_script::{FnScript, HandlerAction, ScriptError};
    use m_bench_testcase::StepOutcome;
    use std::time::Duration;

    fn orchestrator() -> (Arc<Orchestrator>, JoinHandle<()>) {
        Orchestrator::with_loopback(EngineConfig::default())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    struct PingPong;

    #[async_trait]
    impl MessageHandler for PingPong {
        async fn on_message(
            &self,
            _ctx: Arc<ScriptContext>,
            message: &Message,
        ) -> Result<HandlerAction, ScriptError> {
            if message.payload_text() == "ping" {
                Ok(HandlerAction::pass().with_publish(Message::text("bench/pong", "pong")))
            } else {
                Ok(HandlerAction::pass())
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn script_runs_finish_with_a_recorded_outcome() {
        let (orchestrator, _pump) = orchestrator();
        let outcome = orchestrator
            .run_script(
                "trivial",
                Arc::new(FnScript(|_ctx: Arc<ScriptContext>| async move { Ok(true) })),
                RunOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ScriptOutcome::Completed { success: true });
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_transitions_from_running_to_exactly_one_finished() {
        let (orchestrator, _pump) = orchestrator();
        let id = orchestrator.spawn_script(
            "slowish",
            Arc::new(FnScript(|ctx: Arc<ScriptContext>| async move {
                ctx.sleep(Duration::from_millis(100)).await?;
                Ok(true)
            })),
            RunOptions::default(),
        );
        assert_eq!(orchestrator.status(id), Some(RunStatus::Running));
        let outcome = orchestrator.wait(id).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::Completed { success: true });
        assert_eq!(
            orchestrator.status(id),
            Some(RunStatus::Finished(ScriptOutcome::Completed {
                success: true
            }))
        );
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_stops_a_sleeping_script() {
        let (orchestrator, _pump) = orchestrator();
        let id = orchestrator.spawn_script(
            "long-sleeper",
            Arc::new(FnScript(|ctx: Arc<ScriptContext>| async move {
                loop {
                    ctx.sleep(Duration::from_millis(10)).await?;
                    ctx.touch();
                }
            })),
            RunOptions::default(),
        );
        settle().await;
        assert!(orchestrator.cancel(id));
        let outcome = orchestrator.wait(id).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::Cancelled);
        assert!(!orchestrator.cancel(Uuid::new_v4()));
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn handler_reply_travels_back_through_the_loop() {
        let (orchestrator, _pump) = orchestrator();
        orchestrator
            .attach_handler("bench/ping", QosLevel::AtMostOnce, Arc::new(PingPong))
            .unwrap();
        orchestrator.buffer().register("bench/#");

        let outcome = orchestrator
            .run_script(
                "pinger",
                Arc::new(FnScript(|ctx: Arc<ScriptContext>| async move {
                    ctx.publish(Message::text("bench/ping", "ping"))?;
                    Ok(true)
                })),
                RunOptions::default(),
            )
            .await
            .unwrap();
        assert!(outcome.is_success());
        settle().await;

        // Both the ping and the handler's pong were routed and recorded.
        assert_eq!(orchestrator.buffer().count("bench/#"), 2);
        let latest = orchestrator.buffer().query("bench/#");
        assert_eq!(latest[0].topic, "bench/pong");
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replacement_substitutes_the_recorded_message() {
        struct Redactor;

        #[async_trait]
        impl MessageHandler for Redactor {
            async fn on_message(
                &self,
                _ctx: Arc<ScriptContext>,
                message: &Message,
            ) -> Result<HandlerAction, ScriptError> {
                Ok(HandlerAction::pass()
                    .with_replacement(Message::text(message.topic.clone(), "[redacted]")))
            }
        }

        let (orchestrator, _pump) = orchestrator();
        orchestrator
            .attach_handler("raw/#", QosLevel::AtMostOnce, Arc::new(Redactor))
            .unwrap();

        let recorded = orchestrator
            .route_inbound(Message::text("raw/secret", "hunter2"))
            .await;
        assert_eq!(recorded.payload_text(), "[redacted]");
        assert_eq!(orchestrator.buffer().count("raw/#"), 1);
        assert_eq!(
            orchestrator.buffer().query("raw/#")[0].payload_text(),
            "[redacted]"
        );
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hung_handler_times_out_but_the_message_is_still_recorded() {
        struct Hang;

        #[async_trait]
        impl MessageHandler for Hang {
            async fn on_message(
                &self,
                _ctx: Arc<ScriptContext>,
                _message: &Message,
            ) -> Result<HandlerAction, ScriptError> {
                tokio::time::sleep(Duration::from_secs(300)).await;
                Ok(HandlerAction::pass())
            }
        }

        let mut config = EngineConfig::default();
        config.script.default_timeout = Duration::from_millis(100);
        let (orchestrator, _pump) = Orchestrator::with_loopback(config);
        orchestrator
            .attach_handler("stuck/#", QosLevel::AtMostOnce, Arc::new(Hang))
            .unwrap();

        let recorded = orchestrator
            .route_inbound(Message::text("stuck/topic", "payload"))
            .await;
        assert_eq!(recorded.payload_text(), "payload");
        assert_eq!(orchestrator.buffer().count("stuck/#"), 1);
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_case_verdict_lands_in_the_registry() {
        let (orchestrator, _pump) = orchestrator();
        orchestrator.buffer().register("case/#");

        let case = TestCase::new("publish-then-verify", || ())
            .step("publish three", |_, ctx| {
                for i in 0..3 {
                    if ctx
                        .publish(Message::text("case/data", format!("{i}")))
                        .is_err()
                    {
                        return StepOutcome::failed("publish failed");
                    }
                }
                StepOutcome::actioned()
            })
            .step("verify arrival", |_, ctx| {
                if ctx.message_count("case/#") >= 3 {
                    StepOutcome::passed()
                } else {
                    StepOutcome::in_progress()
                }
            })
            .with_options(m_bench_testcase::CaseOptions {
                step_interval: Duration::from_millis(20),
                max_attempts: 50,
            });

        let (id, report_rx) = orchestrator.spawn_test_case(case);
        let report = report_rx.await.unwrap();
        assert_eq!(report.verdict, CaseStatus::Passed);
        assert_eq!(
            orchestrator.status(id),
            Some(RunStatus::Finished(ScriptOutcome::Completed {
                success: true
            }))
        );
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn case_runs_can_be_waited_on_like_scripts() {
        let (orchestrator, _pump) = orchestrator();
        let case = TestCase::new("instant", || ()).step("ok", |_, _| StepOutcome::passed());
        let (id, _report_rx) = orchestrator.spawn_test_case(case);
        let outcome = orchestrator.wait(id).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::Completed { success: true });
        orchestrator.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_joins_case_runs_and_records_their_outcome() {
        let (orchestrator, _pump) = orchestrator();
        let case = TestCase::new("endless-poll", || ())
            .step("never decides", |_, _| StepOutcome::in_progress())
            .with_options(m_bench_testcase::CaseOptions {
                step_interval: Duration::from_millis(10),
                max_attempts: 1_000_000,
            });
        let (id, report_rx) = orchestrator.spawn_test_case(case);
        settle().await;
        assert_eq!(orchestrator.status(id), Some(RunStatus::Running));

        orchestrator.shutdown().await;

        // The case task was joined, so its terminal outcome is visible.
        assert_eq!(
            orchestrator.status(id),
            Some(RunStatus::Finished(ScriptOutcome::Cancelled))
        );
        let report = report_rx.await.unwrap();
        assert_eq!(report.verdict, CaseStatus::Skipped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_cancels_every_registered_run() {
        let (orchestrator, _pump) = orchestrator();
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(orchestrator.spawn_script(
                &format!("worker-{i}"),
                Arc::new(FnScript(|ctx: Arc<ScriptContext>| async move {
                    loop {
                        ctx.sleep(Duration::from_millis(10)).await?;
                        ctx.touch();
                    }
                })),
                RunOptions::default(),
            ));
        }
        settle().await;
        orchestrator.shutdown().await;
        for id in ids {
            assert_eq!(
                orchestrator.status(id),
                Some(RunStatus::Finished(ScriptOutcome::Cancelled))
            );
        }
    }
}
