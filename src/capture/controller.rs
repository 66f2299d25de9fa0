use std::{future, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
    source::{CaptureDevice, PoseEstimator},
    state::{CaptureSnapshot, CaptureState, CaptureStatus},
};
use crate::{
    db::{ExercisePreset, NewSession, Session, SessionStore},
    pose::{extract_angles_with_threshold, Pose, MIN_KEYPOINT_SCORE},
    settings::CaptureSettings,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const COMMAND_BUFFER: usize = 16;

/// Who is recording what, and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub preset_id: Option<String>,
    pub duration_secs: u32,
}

impl CaptureRequest {
    pub fn for_preset(
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
        preset: &ExercisePreset,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
            preset_id: Some(preset.id.clone()),
            duration_secs: preset.duration_secs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub frame_interval: Duration,
    pub countdown_tick: Duration,
    /// Pause between stop and save so the completion state can be shown.
    pub completion_delay: Duration,
    pub min_keypoint_score: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            countdown_tick: Duration::from_secs(1),
            completion_delay: Duration::from_millis(1500),
            min_keypoint_score: MIN_KEYPOINT_SCORE,
        }
    }
}

impl From<&CaptureSettings> for CaptureConfig {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            frame_interval: Duration::from_millis(settings.frame_interval_ms),
            countdown_tick: Duration::from_millis(settings.countdown_tick_ms),
            completion_delay: Duration::from_millis(settings.completion_delay_ms),
            min_keypoint_score: settings.min_keypoint_score,
        }
    }
}

/// How a capture loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Saved(Session),
    Cancelled,
    /// Device or model could not be acquired.
    Failed(String),
    /// Shut down before saving; carries the recording if one was waiting to be saved.
    Abandoned(Option<NewSession>),
}

enum CaptureCommand {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<bool>>),
    Cancel(oneshot::Sender<Result<()>>),
    RetrySave(oneshot::Sender<Result<()>>),
}

/// Handle to a running capture loop. Cheap to clone; all clones drive the same loop.
#[derive(Clone)]
pub struct CaptureController {
    commands: mpsc::Sender<CaptureCommand>,
    snapshots: watch::Receiver<CaptureSnapshot>,
    cancel_token: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<CaptureOutcome>>>>,
}

impl CaptureController {
    pub fn spawn<D, E, S>(
        device: D,
        estimator: E,
        store: Arc<S>,
        request: CaptureRequest,
        config: CaptureConfig,
    ) -> Self
    where
        D: CaptureDevice,
        E: PoseEstimator,
        S: SessionStore,
    {
        let state = CaptureState::new(request.duration_secs);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel_token = CancellationToken::new();

        let worker = CaptureWorker {
            device,
            estimator: Arc::new(estimator),
            store,
            request,
            config,
            state,
            snapshots: snapshot_tx,
            commands: command_rx,
            cancel_token: cancel_token.clone(),
            countdown: None,
            finalize_at: None,
            in_flight: None,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            cancel_token,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves once acquisition is over; fails with the reason if it did not succeed.
    pub async fn wait_until_ready(&self) -> Result<CaptureSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.status != CaptureStatus::Initializing)
            .await
            .map_err(|_| anyhow!("capture loop exited during initialization"))?
            .clone();

        if let CaptureStatus::Error { reason } = &snapshot.status {
            bail!("capture initialization failed: {reason}");
        }
        Ok(snapshot)
    }

    pub async fn start(&self) -> Result<()> {
        self.request(CaptureCommand::Start).await
    }

    /// Returns false when the recording had already stopped.
    pub async fn stop(&self) -> Result<bool> {
        match self.request(CaptureCommand::Stop).await {
            Err(_) if self.snapshot().status == CaptureStatus::Finalizing => Ok(false),
            other => other,
        }
    }

    pub async fn cancel(&self) -> Result<()> {
        // acquisition failures end the loop; cancelling them is a no-op
        if matches!(
            self.snapshot().status,
            CaptureStatus::Error { .. } | CaptureStatus::Cancelled
        ) {
            return Ok(());
        }
        self.request(CaptureCommand::Cancel).await
    }

    /// Re-attempts a save that failed. The recording is kept until a save succeeds.
    pub async fn retry_save(&self) -> Result<()> {
        self.request(CaptureCommand::RetrySave).await
    }

    pub async fn wait_finished(&self) -> Result<CaptureOutcome> {
        let handle = self
            .worker
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("capture loop already joined"))?;
        handle.await.context("capture loop task failed to join")
    }

    /// Signals teardown without waiting; a pending `wait_finished` then resolves.
    pub fn request_shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Tears the loop down: timers and in-flight estimates are dropped and the device released.
    pub async fn shutdown(&self) -> Result<CaptureOutcome> {
        self.request_shutdown();
        self.wait_finished().await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> CaptureCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| anyhow!("capture loop is no longer running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("capture loop exited before replying"))?
    }
}

struct InFlight {
    epoch: u64,
    handle: JoinHandle<Result<Pose>>,
}

struct CaptureWorker<D, E, S> {
    device: D,
    estimator: Arc<E>,
    store: Arc<S>,
    request: CaptureRequest,
    config: CaptureConfig,
    state: CaptureState,
    snapshots: watch::Sender<CaptureSnapshot>,
    commands: mpsc::Receiver<CaptureCommand>,
    cancel_token: CancellationToken,
    countdown: Option<Interval>,
    finalize_at: Option<Instant>,
    in_flight: Option<InFlight>,
}

impl<D, E, S> CaptureWorker<D, E, S>
where
    D: CaptureDevice,
    E: PoseEstimator,
    S: SessionStore,
{
    async fn run(mut self) -> CaptureOutcome {
        if let Err(err) = self.acquire().await {
            let reason = format!("{err:#}");
            log_error!("capture acquisition failed: {reason}");
            self.device.release();
            self.state.fail(reason.clone());
            self.publish();
            return CaptureOutcome::Failed(reason);
        }

        if let Err(err) = self.state.mark_ready() {
            log_error!("capture state out of sync after acquisition: {err}");
        }
        self.publish();
        log_info!(
            "capture ready for patient {} ({}s)",
            self.request.patient_id,
            self.request.duration_secs
        );

        let mut frames = time::interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    log_info!("capture loop shutting down");
                    break CaptureOutcome::Abandoned(self.pending_payload());
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        log_warn!("all capture controllers dropped; abandoning capture");
                        break CaptureOutcome::Abandoned(self.pending_payload());
                    };
                    if let Some(outcome) = self.handle_command(command).await {
                        break outcome;
                    }
                }
                _ = next_countdown_tick(&mut self.countdown) => {
                    if self.state.tick_countdown() {
                        log_info!("countdown finished");
                        if let Err(err) = self.stop_recording() {
                            log_error!("automatic stop failed: {err}");
                        }
                    }
                    self.publish();
                }
                _ = sleep_until_deadline(self.finalize_at) => {
                    self.finalize_at = None;
                    if let Ok(session) = self.finalize().await {
                        break CaptureOutcome::Saved(session);
                    }
                }
                (epoch, result) = join_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.apply_estimate(epoch, result);
                }
                _ = frames.tick(), if self.in_flight.is_none() => {
                    self.dispatch_frame();
                }
            }
        };

        self.teardown();
        outcome
    }

    async fn acquire(&mut self) -> Result<()> {
        self.device
            .open()
            .await
            .context("failed to open capture device")?;
        self.estimator
            .warm_up()
            .await
            .context("failed to load pose model")?;
        Ok(())
    }

    async fn handle_command(&mut self, command: CaptureCommand) -> Option<CaptureOutcome> {
        match command {
            CaptureCommand::Start(reply) => {
                let result = self.state.start(Utc::now());
                if result.is_ok() {
                    let tick = self.config.countdown_tick;
                    self.countdown = Some(time::interval_at(Instant::now() + tick, tick));
                    log_info!("recording started ({}s)", self.state.duration_secs);
                }
                self.publish();
                let _ = reply.send(result);
                None
            }
            CaptureCommand::Stop(reply) => {
                let result = self.stop_recording();
                self.publish();
                let _ = reply.send(result);
                None
            }
            CaptureCommand::Cancel(reply) => {
                let result = self.state.cancel();
                let cancelled = result.is_ok();
                self.publish();
                let _ = reply.send(result);
                if cancelled {
                    log_info!("capture cancelled");
                    Some(CaptureOutcome::Cancelled)
                } else {
                    None
                }
            }
            CaptureCommand::RetrySave(reply) => {
                if !(self.state.has_unsaved_recording() && self.state.save_error.is_some()) {
                    let _ = reply.send(Err(anyhow!("no failed save to retry")));
                    return None;
                }
                match self.finalize().await {
                    Ok(session) => {
                        let _ = reply.send(Ok(()));
                        Some(CaptureOutcome::Saved(session))
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        None
                    }
                }
            }
        }
    }

    fn stop_recording(&mut self) -> Result<bool> {
        let stopped = self.state.stop(Utc::now())?;
        if stopped {
            self.countdown = None;
            self.finalize_at = Some(Instant::now() + self.config.completion_delay);
            log_info!(
                "recording stopped: {} frames, {} skipped",
                self.state.angles.frame_count(),
                self.state.frames_skipped
            );
        }
        Ok(stopped)
    }

    fn dispatch_frame(&mut self) {
        let frame = match self.device.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                log_warn!("frame grab failed: {err:#}");
                self.state.record_skipped(self.state.recording_epoch);
                return;
            }
        };

        let estimator = Arc::clone(&self.estimator);
        let epoch = self.state.recording_epoch;
        let handle = tokio::spawn(async move { estimator.estimate(&frame).await });
        self.in_flight = Some(InFlight { epoch, handle });
    }

    fn apply_estimate(&mut self, epoch: u64, result: Result<Pose>) {
        match result {
            Ok(pose) => {
                let angles = extract_angles_with_threshold(&pose, self.config.min_keypoint_score);
                if !self.state.record_frame(epoch, &angles) && self.state.is_recording() {
                    log_debug!("discarded estimate from epoch {epoch}");
                }
            }
            Err(err) => {
                log_warn!("pose estimate failed, skipping frame: {err:#}");
                self.state.record_skipped(epoch);
            }
        }
        self.publish();
    }

    async fn finalize(&mut self) -> Result<Session> {
        self.state.begin_finalize()?;
        self.publish();

        let payload = self.state.payload(&self.request);
        let frames = payload.angles.frame_count();
        match self.store.save_session(payload).await {
            Ok(session) => {
                log_info!("saved session {} ({} frames)", session.id, frames);
                self.state.finish_save(session.clone());
                self.publish();
                Ok(session)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                log_error!("failed to save session: {reason}");
                self.state.save_failed(reason);
                self.publish();
                Err(err)
            }
        }
    }

    fn pending_payload(&self) -> Option<NewSession> {
        self.state
            .has_unsaved_recording()
            .then(|| self.state.payload(&self.request))
    }

    fn teardown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
        self.countdown = None;
        self.finalize_at = None;
        self.device.release();
        log_info!("capture device released");
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}

async fn next_countdown_tick(countdown: &mut Option<Interval>) {
    match countdown {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn join_in_flight(in_flight: &mut Option<InFlight>) -> (u64, Result<Pose>) {
    match in_flight {
        Some(task) => {
            let result = match (&mut task.handle).await {
                Ok(result) => result,
                Err(err) => Err(anyhow!("pose estimate task failed: {err}")),
            };
            (task.epoch, result)
        }
        None => future::pending().await,
    }
}
