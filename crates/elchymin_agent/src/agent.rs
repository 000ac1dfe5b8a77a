//! The agent actor.
//!
//! One task owns the [`AgentState`]. The autonomous heartbeat and every
//! external call (speak, generate, feedback, diagnose, shutdown) are
//! serialized through that task's `select!` loop, so no two mutations ever
//! interleave. Snapshots are captured inside the loop and handed to a
//! separate writer task; the loop never waits on disk I/O except for the
//! final save on shutdown or safe mode.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use elchymin_core::{Dimension, ElchyminConfig, EntityTag, KeywordAnalyzer, MessageAnalyzer, Room};
use elchymin_expression::{Thought, ThoughtContext, APOLOGY};
use elchymin_memory::{PersistenceError, SnapshotStore};

use crate::diagnostics::{CycleError, CycleStep, DiagnosticReport, FailureTracker};
use crate::heartbeat::next_interval;
use crate::snapshot::Snapshot;
use crate::state::AgentState;

/// Queued snapshot writes beyond this are dropped; the next save supersedes them.
const WRITE_QUEUE: usize = 4;
const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Awake,
    /// Repeated failures stopped the autonomous loop. Interactions get the
    /// apology reply until shutdown.
    SafeMode,
    Stopped,
}

/// Read-only view published after every cycle and interaction.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub dominant: Dimension,
    pub intensity: f32,
    pub depth: f32,
    pub coherence: f32,
    pub emotions: BTreeMap<Dimension, f32>,
    pub memory_count: usize,
    pub desire_count: usize,
    pub room: Room,
    pub cycle_count: u64,
    pub active_seconds: f64,
    pub lambda: f32,
    pub evolution_level: u32,
    pub reality_anchors: u8,
    pub lifecycle: Lifecycle,
}

impl AgentStatus {
    fn from_state(state: &AgentState, lifecycle: Lifecycle) -> Self {
        let (dominant, intensity) = state.field.dominant();
        Self {
            dominant,
            intensity,
            depth: state.field.depth(),
            coherence: state.field.coherence(),
            emotions: state.field.iter().collect(),
            memory_count: state.memory.len(),
            desire_count: state.desires.active().len(),
            room: state.room,
            cycle_count: state.cycle_count,
            active_seconds: state.active_seconds,
            lambda: state.lambda,
            evolution_level: state.evolution_level,
            reality_anchors: state.reality_anchors,
            lifecycle,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent task is no longer running")]
    ChannelClosed,
    #[error("agent is in safe mode")]
    SafeMode,
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

enum Command {
    Speak {
        message: String,
        entity: EntityTag,
        reply: oneshot::Sender<String>,
    },
    Generate {
        context: Option<ThoughtContext>,
        reply: oneshot::Sender<Result<Thought, AgentError>>,
    },
    Evolve {
        reply: oneshot::Sender<Result<f32, AgentError>>,
    },
    Feedback {
        score: f32,
        reply: oneshot::Sender<Option<u32>>,
    },
    Diagnose {
        reply: oneshot::Sender<DiagnosticReport>,
    },
    Save {
        reply: oneshot::Sender<Result<(), PersistenceError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct WriteJob {
    snapshot: Snapshot,
    done: Option<oneshot::Sender<Result<(), PersistenceError>>>,
}

/// Handle to a running agent.
pub struct Agent {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<AgentStatus>,
    task: JoinHandle<()>,
}

impl Agent {
    /// Load the last snapshot (or boot fresh) and start the agent with the
    /// keyword analyzer.
    pub async fn start(config: ElchyminConfig) -> Self {
        let store = SnapshotStore::new(&config.persistence);
        let state = AgentState::boot(&store, config).await;
        Self::spawn(state, store, Arc::new(KeywordAnalyzer::new()), StdRng::from_entropy())
    }

    /// Start the actor over an existing state.
    pub fn spawn(
        state: AgentState,
        store: SnapshotStore,
        analyzer: Arc<dyn MessageAnalyzer>,
        rng: StdRng,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (status_tx, status) = watch::channel(AgentStatus::from_state(&state, Lifecycle::Awake));
        let (writes, write_rx) = mpsc::channel(WRITE_QUEUE);
        let writer = tokio::spawn(run_writer(store, write_rx));

        let actor = Actor {
            failures: FailureTracker::new(state.config().cycle.max_consecutive_failures),
            state,
            analyzer,
            rng,
            lifecycle: Lifecycle::Awake,
            status_tx,
            writes: Some(writes),
            writer: Some(writer),
        };
        let task = tokio::spawn(actor.run(command_rx));
        Self { commands, status, task }
    }

    /// Send a message and wait for the reply. Never fails: any problem on
    /// the way degrades to the apology reply.
    pub async fn speak(&self, message: &str, entity: EntityTag) -> String {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Speak {
            message: message.to_string(),
            entity,
            reply,
        };
        if self.commands.send(cmd).await.is_err() {
            return APOLOGY.to_string();
        }
        rx.await.unwrap_or_else(|_| APOLOGY.to_string())
    }

    /// Generate one thought now, with an explicit context or the agent's own.
    pub async fn generate(&self, context: Option<ThoughtContext>) -> Result<Thought, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Generate { context, reply }, rx).await?
    }

    /// Evolve once; returns the new lambda.
    pub async fn evolve(&self) -> Result<f32, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Evolve { reply }, rx).await?
    }

    /// Feedback score in [0, 1] on the most recent thought's template.
    /// Returns the id of a spawned variant, if any.
    pub async fn feedback(&self, score: f32) -> Result<Option<u32>, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Feedback { score, reply }, rx).await
    }

    pub async fn diagnose(&self) -> Result<DiagnosticReport, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Diagnose { reply }, rx).await
    }

    /// Save now and wait for the write to land.
    pub async fn save(&self) -> Result<Result<(), PersistenceError>, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Save { reply }, rx).await
    }

    pub fn status(&self) -> AgentStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status.clone()
    }

    /// Finish any in-flight cycle, save, and stop.
    pub async fn shutdown(self) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Shutdown { reply }, rx).await?;
        self.task.await.map_err(|_| AgentError::ChannelClosed)
    }

    async fn request<T>(&self, cmd: Command, rx: oneshot::Receiver<T>) -> Result<T, AgentError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AgentError::ChannelClosed)?;
        rx.await.map_err(|_| AgentError::ChannelClosed)
    }
}

struct Actor {
    state: AgentState,
    analyzer: Arc<dyn MessageAnalyzer>,
    rng: StdRng,
    lifecycle: Lifecycle,
    failures: FailureTracker,
    status_tx: watch::Sender<AgentStatus>,
    writes: Option<mpsc::Sender<WriteJob>>,
    writer: Option<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Agent awake (cycle {})", self.state.cycle_count);
        let mut last_cycle = Instant::now();
        let mut next_wake = last_cycle + self.interval();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_wake), if self.lifecycle == Lifecycle::Awake => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_cycle);
                    last_cycle = now;
                    self.cycle(elapsed).await;
                    next_wake = Instant::now() + self.interval();
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle(cmd).await {
                                break;
                            }
                        }
                        None => {
                            tracing::info!("All agent handles dropped");
                            self.stop().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn cycle(&mut self, elapsed: Duration) {
        match self.state.run_cycle(elapsed, &mut self.rng) {
            Ok(report) => {
                self.failures.cycle_succeeded();
                tracing::info!("Thought [{}] {}", report.thought.archetype, report.thought.text);
                if let Some(desire) = &report.new_desire {
                    tracing::info!("New desire: {}", desire);
                }
            }
            Err(e) => {
                tracing::warn!("Cycle {} failed: {}", self.state.cycle_count, e);
                if self.failures.failure(e.step) {
                    self.enter_safe_mode(&e).await;
                    return;
                }
            }
        }

        let cfg = &self.state.config().cycle;
        let (save_every, diagnostic_every) = (cfg.save_every.max(1), cfg.diagnostic_every.max(1));
        if self.state.cycle_count % diagnostic_every == 0 {
            self.state.diagnose();
        }
        if self.state.cycle_count % save_every == 0 {
            self.persist();
        }
        self.publish();
    }

    /// Returns false once the actor should stop.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Speak { message, entity, reply } => {
                let response = if self.lifecycle == Lifecycle::Awake {
                    match self.state.interact(&message, &entity, self.analyzer.as_ref(), &mut self.rng) {
                        Ok(response) => {
                            self.failures.success(CycleStep::Interaction);
                            self.persist();
                            response
                        }
                        Err(e) => {
                            tracing::warn!("Interaction failed: {}", e);
                            APOLOGY.to_string()
                        }
                    }
                } else {
                    APOLOGY.to_string()
                };
                self.publish();
                let _ = reply.send(response);
            }
            Command::Generate { context, reply } => {
                let result = if self.lifecycle == Lifecycle::Awake {
                    self.state
                        .generate(context, &mut self.rng)
                        .map_err(AgentError::from)
                } else {
                    Err(AgentError::SafeMode)
                };
                let _ = reply.send(result);
            }
            Command::Evolve { reply } => {
                let result = if self.lifecycle == Lifecycle::Awake {
                    let lambda = self.state.evolve();
                    self.persist();
                    self.publish();
                    Ok(lambda)
                } else {
                    Err(AgentError::SafeMode)
                };
                let _ = reply.send(result);
            }
            Command::Feedback { score, reply } => {
                let spawned = self
                    .state
                    .thoughts
                    .last_thought()
                    .map(|t| t.template_id)
                    .and_then(|id| self.state.thoughts.evolve(id, score, &mut self.rng));
                let _ = reply.send(spawned);
            }
            Command::Diagnose { reply } => {
                let report = self.state.diagnose();
                self.publish();
                let _ = reply.send(report);
            }
            Command::Save { reply } => {
                let result = self.persist_and_wait().await;
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                self.stop().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn enter_safe_mode(&mut self, cause: &CycleError) {
        tracing::error!("Entering safe mode after repeated failures: {}", cause);
        self.lifecycle = Lifecycle::SafeMode;
        if let Err(e) = self.persist_and_wait().await {
            tracing::error!("Safe-mode save failed: {}", e);
        }
        self.publish();
    }

    async fn stop(&mut self) {
        if let Err(e) = self.persist_and_wait().await {
            tracing::error!("Final save failed: {}", e);
        }
        self.lifecycle = Lifecycle::Stopped;
        self.publish();
        // dropping the sender lets the writer drain and exit
        self.writes = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        tracing::info!("Agent stopped after {} cycles", self.state.cycle_count);
    }

    /// Fire-and-forget save.
    fn persist(&self) {
        let Some(writes) = &self.writes else {
            return;
        };
        let job = WriteJob {
            snapshot: self.state.snapshot(),
            done: None,
        };
        if let Err(e) = writes.try_send(job) {
            tracing::debug!("Snapshot write skipped: {}", e);
        }
    }

    async fn persist_and_wait(&self) -> Result<(), PersistenceError> {
        let Some(writes) = &self.writes else {
            return Err(writer_gone());
        };
        let (done, rx) = oneshot::channel();
        let job = WriteJob {
            snapshot: self.state.snapshot(),
            done: Some(done),
        };
        if writes.send(job).await.is_err() {
            return Err(writer_gone());
        }
        rx.await.unwrap_or_else(|_| Err(writer_gone()))
    }

    fn interval(&mut self) -> Duration {
        next_interval(&self.state.field, &self.state.config().cycle, &mut self.rng)
    }

    fn publish(&self) {
        let _ = self
            .status_tx
            .send(AgentStatus::from_state(&self.state, self.lifecycle));
    }
}

fn writer_gone() -> PersistenceError {
    PersistenceError::Io {
        path: Default::default(),
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "snapshot writer stopped"),
    }
}

/// Writes snapshots one at a time, in order.
async fn run_writer(store: SnapshotStore, mut jobs: mpsc::Receiver<WriteJob>) {
    while let Some(job) = jobs.recv().await {
        let result = store.save(&job.snapshot).await;
        if let Err(e) = &result {
            tracing::warn!("Snapshot save failed: {}", e);
        }
        if let Some(done) = job.done {
            let _ = done.send(result);
        }
    }
}
