//! The macro engine
//!
//! A [`MacroEngine`] owns one background task running the control loop. The
//! execution stack lives inside that task; callers only send requests (push,
//! clear, step) and flip shared signals (pause gate, ready gate, deferred
//! pause/stop flags). Requests are applied at the top of each loop iteration,
//! never while a command is running.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::EngineConfig;
use super::catalog::CraftActionCatalog;
use super::error::{CommandError, ExecError, ExecResult};
use super::execute::{CommandOutcome, ExecContext, execute, resolve_macro};
use super::frame::ActiveMacro;
use super::host::{Host, MacroDefinition};
use super::signal::{CancelToken, Gate};
use crate::interpreter::CommandProducer;

/// Externally observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// The environment cannot run commands; the stack is empty
    NotReady,
    /// Ready with nothing to run
    Idle,
    /// Advancing the top frame
    Running,
    /// Frames are waiting for a resume
    Paused,
    /// The control loop has exited
    Stopped,
}

/// Status of one frame on the stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameStatus {
    /// Frame id
    pub id: Uuid,
    /// Macro name
    pub name: String,
    /// Zero-based program counter
    pub index: usize,
    /// Number of commands, when known
    pub total: Option<usize>,
    /// Source text of the command under the program counter
    pub current: Option<String>,
    /// Loop restarts so far
    pub iterations: u32,
    /// Frame creation time
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Current state
    pub state: EngineState,
    /// Frames, top of stack first
    pub frames: Vec<FrameStatus>,
    /// A pause is armed for the next `/loop`
    pub pausing_soon: bool,
    /// A stop is armed for the next `/loop`
    pub stopping_soon: bool,
    /// Frames removed from the stack so far, for any reason
    pub retired: u64,
}

impl EngineStatus {
    fn initial(state: EngineState) -> Self {
        Self {
            state,
            frames: Vec::new(),
            pausing_soon: false,
            stopping_soon: false,
            retired: 0,
        }
    }
}

enum Request {
    Push(ActiveMacro),
    Clear,
    Step,
}

struct Shared {
    pause: Gate,
    ready: Gate,
    cancel: CancelToken,
    pause_at_loop: AtomicBool,
    stop_at_loop: AtomicBool,
}

/// Handle to a running macro engine
pub struct MacroEngine {
    host: Host,
    config: Arc<EngineConfig>,
    shared: Arc<Shared>,
    requests: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<EngineStatus>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MacroEngine {
    /// Start the control loop on the current tokio runtime.
    ///
    /// Craft action names are loaded from the environment on first use.
    pub fn spawn(host: Host, config: EngineConfig) -> Self {
        let environment = host.environment.clone();
        let catalog = CraftActionCatalog::new(move || environment.craft_action_names());
        Self::spawn_with_catalog(host, config, catalog)
    }

    /// Start the control loop with an explicit craft action catalog
    pub fn spawn_with_catalog(host: Host, config: EngineConfig, catalog: CraftActionCatalog) -> Self {
        let ready = host.environment.is_ready();
        let shared = Arc::new(Shared {
            pause: Gate::new(false),
            ready: Gate::new(ready),
            cancel: CancelToken::new(),
            pause_at_loop: AtomicBool::new(false),
            stop_at_loop: AtomicBool::new(false),
        });
        let config = Arc::new(config);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let initial = if ready {
            EngineState::Idle
        } else {
            EngineState::NotReady
        };
        let (status_tx, status_rx) = watch::channel(EngineStatus::initial(initial));

        let worker = Worker {
            host: host.clone(),
            config: config.clone(),
            catalog,
            shared: shared.clone(),
            requests: requests_rx,
            status: status_tx,
            stack: Vec::new(),
            state: initial,
            retired: 0,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            host,
            config,
            shared,
            requests: requests_tx,
            status: status_rx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Push a stored macro as a new top frame and resume
    pub fn enqueue(&self, definition: MacroDefinition) -> ExecResult<Uuid> {
        self.enqueue_with_loops(definition, None)
    }

    /// Push a stored macro with a loop count override
    pub fn enqueue_with_loops(
        &self,
        definition: MacroDefinition,
        loops: Option<i32>,
    ) -> ExecResult<Uuid> {
        let frame = ActiveMacro::from_definition(
            definition,
            loops,
            &self.config.craft_loop,
            self.host.scripts.as_ref(),
        )?;
        Ok(self.push(frame))
    }

    /// Push a frame fed by a line producer
    pub fn enqueue_producer(
        &self,
        name: impl Into<String>,
        producer: Box<dyn CommandProducer>,
    ) -> Uuid {
        let definition = MacroDefinition::new(name, String::new()).scripted();
        self.push(ActiveMacro::from_producer(definition, producer))
    }

    /// Resolve a macro through the registry and run it.
    ///
    /// Zero or several matches are both an error.
    pub fn run_by_name(&self, name: &str, loops: Option<i32>) -> ExecResult<Uuid> {
        let definition = resolve_macro(self.host.registry.as_ref(), name)?;
        self.enqueue_with_loops(definition, loops)
    }

    fn push(&self, frame: ActiveMacro) -> Uuid {
        let id = frame.id();
        tracing::debug!(macro_name = frame.name(), %id, "enqueue");
        self.send(Request::Push(frame));
        id
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            tracing::warn!("macro engine is no longer running");
        }
    }

    /// Pause now, or at the next `/loop`
    pub fn pause(&self, at_loop: bool) {
        if at_loop {
            self.shared.pause_at_loop.store(true, Ordering::SeqCst);
        } else {
            self.shared.pause.close();
        }
    }

    /// Stop now (clearing the stack), or at the next `/loop`
    pub fn stop(&self, at_loop: bool) {
        if at_loop {
            self.shared.stop_at_loop.store(true, Ordering::SeqCst);
        } else {
            self.shared.pause.close();
            self.send(Request::Clear);
        }
    }

    /// Open the pause gate
    pub fn resume(&self) {
        self.shared.pause.open();
    }

    /// Move the top frame's program counter forward once without executing.
    ///
    /// Only applies while paused; a step that arrives while running is ignored.
    pub fn step(&self) {
        self.send(Request::Step);
    }

    /// Report environment readiness; losing it clears the stack
    pub fn set_ready(&self, ready: bool) {
        if ready {
            self.shared.ready.open();
        } else {
            self.shared.ready.close();
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> EngineStatus {
        let mut status = self.status.borrow().clone();
        status.pausing_soon = self.shared.pause_at_loop.load(Ordering::SeqCst);
        status.stopping_soon = self.shared.stop_at_loop.load(Ordering::SeqCst);
        status
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        self.status.borrow().state
    }

    /// Wait until a published status satisfies `predicate`
    pub async fn wait_for_status<F>(&self, mut predicate: F) -> EngineStatus
    where
        F: FnMut(&EngineStatus) -> bool,
    {
        let mut rx = self.status.clone();
        if let Ok(status) = rx.wait_for(|status| predicate(status)).await {
            return status.clone();
        }
        let last = rx.borrow().clone();
        last
    }

    /// Cancel every pending wait and let the control loop exit
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "macro engine task failed");
            }
        }
    }
}

impl Drop for MacroEngine {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

enum Wake {
    Proceed,
    Request(Request),
    Cancelled,
}

struct Worker {
    host: Host,
    config: Arc<EngineConfig>,
    catalog: CraftActionCatalog,
    shared: Arc<Shared>,
    requests: mpsc::UnboundedReceiver<Request>,
    status: watch::Sender<EngineStatus>,
    stack: Vec<ActiveMacro>,
    state: EngineState,
    retired: u64,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!("macro engine started");
        loop {
            if self.shared.cancel.is_cancelled() || !self.drain_requests() {
                break;
            }

            if !self.shared.ready.is_open() {
                if !self.stack.is_empty() {
                    tracing::info!(frames = self.stack.len(), "environment not ready, clearing stack");
                    self.clear_stack();
                }
                self.publish(EngineState::NotReady);
                if !self.block(true).await {
                    break;
                }
                continue;
            }

            if !self.shared.pause.is_open() {
                let state = if self.stack.is_empty() {
                    EngineState::Idle
                } else {
                    EngineState::Paused
                };
                self.publish(state);
                if !self.block(false).await {
                    break;
                }
                continue;
            }

            if self.stack.is_empty() {
                self.shared.pause.close();
                continue;
            }

            self.publish(EngineState::Running);
            if let Err(ExecError::Cancelled) = self.tick().await {
                break;
            }
        }

        self.clear_stack();
        self.publish(EngineState::Stopped);
        tracing::info!("macro engine stopped");
    }

    /// Apply queued requests; false once every handle is gone.
    fn drain_requests(&mut self) -> bool {
        loop {
            match self.requests.try_recv() {
                Ok(request) => self.apply(request),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, request: Request) {
        match request {
            Request::Push(frame) => {
                tracing::info!(macro_name = frame.name(), depth = self.stack.len() + 1, "starting macro");
                self.stack.push(frame);
                self.shared.pause.open();
            }
            Request::Clear => {
                if !self.stack.is_empty() {
                    tracing::info!(frames = self.stack.len(), "clearing stack");
                }
                self.clear_stack();
            }
            Request::Step => {
                if self.shared.pause.is_open() {
                    tracing::debug!("ignoring step while running");
                    return;
                }
                if let Some(frame) = self.stack.last_mut() {
                    frame.advance();
                    tracing::debug!(macro_name = frame.name(), index = frame.index(), "stepped");
                }
            }
        }
    }

    /// Block until something may have changed; false on cancellation.
    async fn block(&mut self, for_ready: bool) -> bool {
        let wake = {
            let shared = &self.shared;
            let requests = &mut self.requests;
            tokio::select! {
                _ = shared.cancel.cancelled() => Wake::Cancelled,
                _ = shared.ready.opened(), if for_ready => Wake::Proceed,
                _ = shared.pause.opened(), if !for_ready => Wake::Proceed,
                _ = shared.ready.closed(), if !for_ready => Wake::Proceed,
                request = requests.recv() => match request {
                    Some(request) => Wake::Request(request),
                    None => Wake::Cancelled,
                },
            }
        };
        match wake {
            Wake::Proceed => true,
            Wake::Request(request) => {
                self.apply(request);
                true
            }
            Wake::Cancelled => false,
        }
    }

    /// Fetch, execute and account for one command of the top frame.
    async fn tick(&mut self) -> ExecResult<()> {
        let ctx = ExecContext {
            host: &self.host,
            config: &self.config,
            cancel: &self.shared.cancel,
            catalog: &self.catalog,
        };
        let Some(frame) = self.stack.last_mut() else {
            return Ok(());
        };
        let step = frame.index() + 1;

        let pulled = tokio::select! {
            _ = self.shared.cancel.cancelled() => return Err(ExecError::Cancelled),
            pulled = frame.current_command() => pulled,
        };
        let command = match pulled {
            Ok(Some(command)) => command,
            Ok(None) => {
                tracing::info!(macro_name = frame.name(), "macro finished");
                self.pop_frame();
                return Ok(());
            }
            Err(err) => {
                let name = frame.name().to_string();
                self.report(&err, &name, step);
                return Ok(());
            }
        };

        let text = command.text.clone();
        let delay = command.wait_policy().sample(&mut rand::thread_rng());
        let result = AssertUnwindSafe(execute(command, &ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ExecError::Unexpected(anyhow::anyhow!(
                    "panic while executing command: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match result {
            Ok(CommandOutcome::Continue) => {
                frame.advance();
                self.shared.cancel.sleep(delay).await?;
            }
            Ok(CommandOutcome::Skipped) => frame.advance(),
            Ok(CommandOutcome::Loop { restart }) => {
                if self.shared.stop_at_loop.swap(false, Ordering::SeqCst) {
                    tracing::info!(macro_name = frame.name(), "stopping at loop");
                    self.host.output.print_info("Stopping at loop");
                    self.clear_stack();
                    return Ok(());
                }
                if restart {
                    if let Err(err) = frame.restart() {
                        let name = frame.name().to_string();
                        self.report(&err, &text, step);
                        tracing::debug!(macro_name = %name, "loop refused");
                        return Ok(());
                    }
                } else {
                    frame.advance();
                }
                if self.shared.pause_at_loop.swap(false, Ordering::SeqCst) {
                    tracing::info!(macro_name = frame.name(), "pausing at loop");
                    self.host.output.print_info("Pausing at loop");
                    self.shared.pause.close();
                }
                self.shared.cancel.sleep(delay).await?;
            }
            Ok(CommandOutcome::Pause { message, severity }) => {
                tracing::info!(macro_name = frame.name(), step, %message, "macro paused");
                self.host.output.print_notice(&message, severity);
                self.shared.pause.close();
            }
            Ok(CommandOutcome::GateComplete) => {
                tracing::info!(macro_name = frame.name(), "craft loop complete");
                self.host.output.print_info("Craft loop complete");
                self.pop_frame();
            }
            Ok(CommandOutcome::Push(nested)) => {
                frame.advance();
                tracing::info!(
                    macro_name = nested.name(),
                    depth = self.stack.len() + 1,
                    "starting nested macro"
                );
                self.stack.push(nested);
                self.shared.cancel.sleep(delay).await?;
            }
            Err(ExecError::Command(err)) => self.report(&err, &text, step),
            Err(ExecError::Cancelled) => return Err(ExecError::Cancelled),
            Err(ExecError::Unexpected(err)) => {
                tracing::error!(error = %err, command = %text, "unexpected failure, clearing stack");
                self.host
                    .output
                    .print_error("Macro failed unexpectedly, stopping all macros");
                self.clear_stack();
            }
        }
        Ok(())
    }

    fn pop_frame(&mut self) {
        if self.stack.pop().is_some() {
            self.retired += 1;
        }
    }

    fn clear_stack(&mut self) {
        self.retired += self.stack.len() as u64;
        self.stack.clear();
    }

    fn report(&self, err: &CommandError, text: &str, step: usize) {
        tracing::warn!(error = %err, command = %text, step, "command failed");
        self.host
            .output
            .print_error(&format!("{} ({}, step {})", err, text, step));
        self.shared.pause.close();
    }

    fn publish(&mut self, state: EngineState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "engine state");
        }
        self.state = state;
        let frames = self.stack.iter().rev().map(ActiveMacro::status).collect();
        self.status.send_replace(EngineStatus {
            state,
            frames,
            pausing_soon: self.shared.pause_at_loop.load(Ordering::SeqCst),
            stopping_soon: self.shared.stop_at_loop.load(Ordering::SeqCst),
            retired: self.retired,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
