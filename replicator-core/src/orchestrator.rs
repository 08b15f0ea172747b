//! Orchestrator sequences the capture → reconstruction cycle for each room
//!
//! `join_session`, `send_frame` and `leave` finish without touching the
//! network. `process_3d` only flips the room to `Processing` and hands the
//! pipeline to a tracked task, so the event path never waits on upstream
//! services. Pipelines share a semaphore that bounds how many run at once.
//!
//! A room holds an in-flight claim from `process_3d` until its pipeline ends.
//! The claim outlives the session, so a room that closes and reopens while
//! its pipeline runs still reports `Busy`. Each pipeline also carries the
//! ticket of the session that started it and only settles that session.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, PipelineMode};
use crate::error::{FrameError, ReplicatorError, SessionError};
use crate::events::types::{
    STEP_BUSY, STEP_FAILED, STEP_GENERATING, STEP_GENERATING_OFFLINE, STEP_NO_IMAGE,
    STEP_UPLOADING,
};
use crate::events::{RoomBroadcaster, RoomEvent};
use crate::frames::{Frame, FrameStore, frame_preview_url};
use crate::janitor::Janitor;
use crate::mesh::{MeshGenerator, MeshOutcome};
use crate::session::{ConnectionId, LeaveOutcome, Role, RoomId, SessionRegistry, SessionState};

/// File name of a room's downloaded model
pub const MODEL_FILE_NAME: &str = "reconstruction.glb";

/// Result of a connection joining a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    /// A `session_status: connected` event was broadcast
    pub announced: bool,
    /// Room the connection was moved out of
    pub left: Option<LeaveOutcome>,
}

/// What `process_3d` did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A pipeline task was spawned
    Started,
    /// A pipeline is already running for the room
    Busy,
    /// The room has no captured frame
    NoFrame,
}

/// Per-room pipeline coordinator
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<SessionRegistry>,
    frames: Arc<FrameStore>,
    generator: Arc<dyn MeshGenerator>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<RoomId>>>,
    next_ticket: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        generator: Arc<dyn MeshGenerator>,
        broadcaster: Arc<dyn RoomBroadcaster>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_pipelines.max(1)));
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            frames: Arc::new(FrameStore::new()),
            generator,
            broadcaster,
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            next_ticket: AtomicU64::new(1),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    /// Pipelines currently running or waiting for a slot
    pub fn active_pipelines(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Add a connection to a room
    ///
    /// The room's first sensor triggers a `session_status: connected` broadcast.
    pub async fn join_session(
        &self,
        connection_id: &str,
        room_id: RoomId,
        role: Role,
    ) -> JoinOutcome {
        let result = self.registry.join(connection_id, &room_id, role).await;

        if let Some(left) = &result.left {
            self.release_room(left).await;
        }

        if result.first_sensor {
            info!(room_id = %room_id, "Sensor connected");
            self.broadcaster.emit_to_room(&room_id, RoomEvent::connected());
        }

        JoinOutcome {
            room_id,
            announced: result.first_sensor,
            left: result.left,
        }
    }

    /// Remove a connection from its room
    pub async fn leave(&self, connection_id: &ConnectionId) -> Option<LeaveOutcome> {
        let outcome = self.registry.leave(connection_id).await?;
        self.release_room(&outcome).await;
        Some(outcome)
    }

    async fn release_room(&self, outcome: &LeaveOutcome) {
        if outcome.room_closed {
            self.frames.remove(&outcome.room_id).await;
            debug!(room_id = %outcome.room_id, "Room closed");
        }
    }

    /// Store a frame for the room and report the running count
    ///
    /// An undecodable payload is reported to the room as an `error` event and
    /// returned, leaving the previous frame in place.
    pub async fn send_frame(
        &self,
        room_id: &RoomId,
        payload: &str,
    ) -> Result<u64, ReplicatorError> {
        if !self.registry.contains(room_id).await {
            return Err(SessionError::UnknownRoom(room_id.to_string()).into());
        }

        let count = match self.frames.store_frame(room_id, payload).await {
            Ok(count) => count,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Rejected frame");
                self.broadcaster.emit_to_room(
                    room_id,
                    RoomEvent::error("INVALID_FRAME", frame_error_message(&e)),
                );
                return Err(e.into());
            }
        };

        // A frame arriving mid-pipeline replaces the stored one but leaves
        // the room in Processing
        self.registry
            .with_session(room_id, |session| {
                if session.state() != SessionState::Processing {
                    session.transition_to(SessionState::FrameReceived).ok();
                }
            })
            .await
            .ok();

        debug!(room_id = %room_id, count, "Frame stored");
        self.broadcaster.emit_to_room(
            room_id,
            RoomEvent::FrameReceived {
                count,
                preview: Some(frame_preview_url(room_id, count)),
            },
        );
        Ok(count)
    }

    /// Start the reconstruction pipeline for a room
    ///
    /// Returns as soon as the pipeline task is spawned. A room that is already
    /// processing gets a `Busy` status and keeps its running task.
    pub async fn process_3d(&self, room_id: &RoomId) -> Result<ProcessOutcome, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ShuttingDown);
        }
        if !self.registry.contains(room_id).await {
            return Err(SessionError::UnknownRoom(room_id.to_string()));
        }

        let frame = match self.frames.load_frame(room_id).await {
            Ok(frame) => frame,
            Err(_) => {
                self.broadcaster
                    .emit_to_room(room_id, RoomEvent::processing(STEP_NO_IMAGE));
                return Ok(ProcessOutcome::NoFrame);
            }
        };

        let Some(claim) = InFlightClaim::acquire(&self.in_flight, room_id) else {
            info!(room_id = %room_id, "Rejected process_3d, pipeline already running");
            self.broadcaster
                .emit_to_room(room_id, RoomEvent::processing(STEP_BUSY));
            return Ok(ProcessOutcome::Busy);
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.registry
            .with_session(room_id, |session| session.begin_pipeline(ticket))
            .await??;

        let pipeline = Pipeline {
            room_id: room_id.clone(),
            ticket,
            frame,
            mode: self.config.mode.clone(),
            output_dir: self.config.output_dir.clone(),
            registry: Arc::clone(&self.registry),
            generator: Arc::clone(&self.generator),
            broadcaster: Arc::clone(&self.broadcaster),
            permits: Arc::clone(&self.permits),
        };
        self.tracker.spawn(pipeline.run(claim));

        info!(
            room_id = %room_id,
            ticket,
            active = self.tracker.len(),
            "Pipeline started"
        );
        Ok(ProcessOutcome::Started)
    }

    /// Stop accepting new pipelines; running ones continue
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Signal shutdown and wait up to `timeout` for running pipelines
    ///
    /// Returns false if pipelines were still running when the wait ended.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }

    /// One janitor pass: drop orphaned frames and stale output directories
    pub async fn sweep(&self) -> std::io::Result<Vec<PathBuf>> {
        let live: HashSet<RoomId> = self.registry.room_ids().await.into_iter().collect();
        let dropped = self.frames.retain_rooms(&live).await;
        if dropped > 0 {
            debug!(dropped, "Dropped frames of closed rooms");
        }
        Janitor::new(&self.config.output_dir, self.config.janitor.max_age)
            .sweep(&live)
            .await
    }

    /// Run [`sweep`](Self::sweep) every `janitor.interval` until shutdown
    pub fn spawn_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.janitor.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match orchestrator.sweep().await {
                            Ok(removed) if !removed.is_empty() => {
                                info!(count = removed.len(), "Removed stale room output");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Janitor sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

/// Client-facing text for a rejected frame
fn frame_error_message(error: &FrameError) -> &'static str {
    match error {
        FrameError::MalformedPayload(_) => "Frame payload is not a data URL",
        FrameError::Decode(_) => "Frame could not be decoded",
        FrameError::NotFound(_) => "No frame captured",
    }
}

/// A room's exclusive right to run a pipeline, released on drop
struct InFlightClaim {
    rooms: Arc<Mutex<HashSet<RoomId>>>,
    room_id: RoomId,
}

impl InFlightClaim {
    /// None when the room already has a pipeline in flight
    fn acquire(rooms: &Arc<Mutex<HashSet<RoomId>>>, room_id: &RoomId) -> Option<Self> {
        let inserted = rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room_id.clone());

        inserted.then(|| Self {
            rooms: Arc::clone(rooms),
            room_id: room_id.clone(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.room_id);
    }
}

/// Everything one pipeline run needs, detached from the orchestrator
struct Pipeline {
    room_id: RoomId,
    /// Session ticket this pipeline settles when it ends
    ticket: u64,
    frame: Arc<Frame>,
    mode: PipelineMode,
    output_dir: PathBuf,
    registry: Arc<SessionRegistry>,
    generator: Arc<dyn MeshGenerator>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    permits: Arc<Semaphore>,
}

impl Pipeline {
    async fn run(self, claim: InFlightClaim) {
        // The semaphore is never closed, so acquire only fails if it is dropped
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };

        let model_url = match &self.mode {
            PipelineMode::Offline { model_url, delay } => {
                self.emit(RoomEvent::processing(STEP_GENERATING_OFFLINE));
                tokio::time::sleep(*delay).await;
                Some(model_url.clone())
            }
            PipelineMode::Live => self.run_live().await,
        };

        let next = if model_url.is_some() {
            SessionState::Completed
        } else {
            SessionState::Failed
        };
        let settled = self
            .registry
            .with_session(&self.room_id, |session| {
                session.finish_pipeline(self.ticket, next)
            })
            .await
            .unwrap_or(false);
        if !settled {
            // The room closed, and possibly reopened, while the pipeline ran
            debug!(
                room_id = %self.room_id,
                ticket = self.ticket,
                "Pipeline result has no session"
            );
        }
        drop(claim);

        match model_url {
            Some(url) => {
                info!(room_id = %self.room_id, url = %url, "Model ready");
                self.emit(RoomEvent::ModelReady { url });
            }
            None => self.emit(RoomEvent::processing(STEP_FAILED)),
        }
    }

    /// Upload then reconstruct; returns the model reference on success
    async fn run_live(&self) -> Option<String> {
        self.emit(RoomEvent::processing(STEP_UPLOADING));
        let image_url = match self.generator.upload(&self.frame).await {
            Ok(url) => url,
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Upload phase failed");
                return None;
            }
        };

        self.emit(RoomEvent::processing(STEP_GENERATING));
        let output_path = self
            .output_dir
            .join(self.room_id.as_str())
            .join(MODEL_FILE_NAME);

        match self.generator.reconstruct(&image_url, &output_path).await {
            Ok(MeshOutcome::Success { .. }) => {
                Some(format!("/files/{}/{}", self.room_id, MODEL_FILE_NAME))
            }
            Ok(outcome) => {
                warn!(
                    room_id = %self.room_id,
                    outcome = outcome.label(),
                    "Reconstruction did not succeed"
                );
                None
            }
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Reconstruction failed");
                None
            }
        }
    }

    fn emit(&self, event: RoomEvent) {
        self.broadcaster.emit_to_room(&self.room_id, event);
    }
}
