use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::controller::CaptureRequest;
use crate::{
    db::{NewSession, Session},
    pose::{AngleSeries, JointAngles},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum CaptureStatus {
    Initializing,
    Ready,
    Recording,
    Stopped,
    /// Payload handed to persistence. Terminal once `saved_session` is set.
    Finalizing,
    Cancelled,
    Error { reason: String },
}

/// Observer view of the loop, published after every transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub status: CaptureStatus,
    pub remaining_secs: i64,
    pub frames_recorded: usize,
    pub frames_skipped: u64,
    /// Angles of the most recent estimate, recorded or not; drives the live overlay.
    pub latest_angles: Option<JointAngles>,
    pub save_error: Option<String>,
    pub saved_session: Option<Session>,
}

/// State machine of one capture-loop instance. Holds no timers; the controller drives it with
/// discrete events and owns the scheduling.
#[derive(Debug, Clone)]
pub struct CaptureState {
    pub status: CaptureStatus,
    pub duration_secs: u32,
    pub remaining_secs: i64,
    /// Bumped on every start. Estimates carry the epoch they were dispatched under and are
    /// only appended while it is still current.
    pub recording_epoch: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub angles: AngleSeries,
    pub frames_skipped: u64,
    pub latest_angles: Option<JointAngles>,
    pub save_error: Option<String>,
    pub saved_session: Option<Session>,
}

impl CaptureState {
    pub fn new(duration_secs: u32) -> Self {
        Self {
            status: CaptureStatus::Initializing,
            duration_secs,
            remaining_secs: i64::from(duration_secs),
            recording_epoch: 0,
            started_at: None,
            stopped_at: None,
            angles: AngleSeries::new(),
            frames_skipped: 0,
            latest_angles: None,
            save_error: None,
            saved_session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == CaptureStatus::Recording
    }

    pub fn mark_ready(&mut self) -> Result<()> {
        if self.status != CaptureStatus::Initializing {
            bail!("capture is not initializing");
        }
        self.status = CaptureStatus::Ready;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = CaptureStatus::Error {
            reason: reason.into(),
        };
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            CaptureStatus::Ready => {}
            CaptureStatus::Initializing => bail!("capture device is still initializing"),
            CaptureStatus::Recording => bail!("recording already in progress"),
            _ => bail!("capture loop cannot start a new recording"),
        }
        if self.duration_secs == 0 {
            bail!("recording duration must be greater than zero");
        }

        self.angles.clear();
        self.frames_skipped = 0;
        self.remaining_secs = i64::from(self.duration_secs);
        self.recording_epoch += 1;
        self.started_at = Some(now);
        self.stopped_at = None;
        self.status = CaptureStatus::Recording;
        Ok(())
    }

    /// Applies one estimate. Returns whether the frame was appended to the recording.
    pub fn record_frame(&mut self, epoch: u64, angles: &JointAngles) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.latest_angles = Some(*angles);

        if self.is_recording() && epoch == self.recording_epoch {
            self.angles.push(angles);
            true
        } else {
            false
        }
    }

    pub fn record_skipped(&mut self, epoch: u64) {
        if self.is_recording() && epoch == self.recording_epoch {
            self.frames_skipped += 1;
        }
    }

    /// One countdown second. Returns true when the countdown has run out.
    pub fn tick_countdown(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.remaining_secs -= 1;
        self.remaining_secs <= 0
    }

    /// Ends the recording. `Ok(false)` when it had already ended.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            CaptureStatus::Recording => {
                self.status = CaptureStatus::Stopped;
                self.stopped_at = Some(now);
                self.remaining_secs = self.remaining_secs.max(0);
                Ok(true)
            }
            CaptureStatus::Stopped | CaptureStatus::Finalizing => Ok(false),
            _ => bail!("no recording in progress"),
        }
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            CaptureStatus::Initializing | CaptureStatus::Ready | CaptureStatus::Error { .. } => {
                self.status = CaptureStatus::Cancelled;
                Ok(())
            }
            CaptureStatus::Cancelled => Ok(()),
            CaptureStatus::Recording => bail!("stop the recording before cancelling"),
            CaptureStatus::Stopped | CaptureStatus::Finalizing => {
                bail!("recording already finished and will be saved")
            }
        }
    }

    pub fn begin_finalize(&mut self) -> Result<()> {
        if self.status != CaptureStatus::Stopped {
            bail!("nothing to save");
        }
        self.status = CaptureStatus::Finalizing;
        self.save_error = None;
        Ok(())
    }

    pub fn finish_save(&mut self, session: Session) {
        self.saved_session = Some(session);
    }

    /// Back to `Stopped` with the recording intact so the save can be retried.
    pub fn save_failed(&mut self, reason: impl Into<String>) {
        self.status = CaptureStatus::Stopped;
        self.save_error = Some(reason.into());
    }

    pub fn has_unsaved_recording(&self) -> bool {
        self.status == CaptureStatus::Stopped
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            CaptureStatus::Cancelled | CaptureStatus::Error { .. } => true,
            CaptureStatus::Finalizing => self.saved_session.is_some(),
            _ => false,
        }
    }

    pub fn payload(&self, request: &CaptureRequest) -> NewSession {
        NewSession {
            patient_id: request.patient_id.clone(),
            doctor_id: request.doctor_id.clone(),
            recorded_at: self.stopped_at.unwrap_or_else(Utc::now),
            exercise_preset_id: request.preset_id.clone(),
            angles: self.angles.clone(),
        }
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            status: self.status.clone(),
            remaining_secs: self.remaining_secs.max(0),
            frames_recorded: self.angles.frame_count(),
            frames_skipped: self.frames_skipped,
            latest_angles: self.latest_angles,
            save_error: self.save_error.clone(),
            saved_session: self.saved_session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64) -> JointAngles {
        JointAngles {
            left_elbow: Some(value),
            right_elbow: None,
            left_knee: Some(value + 10.0),
            right_knee: Some(value + 20.0),
        }
    }

    fn recording(duration_secs: u32) -> CaptureState {
        let mut state = CaptureState::new(duration_secs);
        state.mark_ready().unwrap();
        state.start(Utc::now()).unwrap();
        state
    }

    #[test]
    fn test_start_only_from_ready() {
        let mut state = CaptureState::new(10);
        assert!(state.start(Utc::now()).is_err());
        state.mark_ready().unwrap();
        state.start(Utc::now()).unwrap();
        assert!(state.start(Utc::now()).is_err());
        assert_eq!(state.recording_epoch, 1);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut state = CaptureState::new(0);
        state.mark_ready().unwrap();
        assert!(state.start(Utc::now()).is_err());
        assert_eq!(state.status, CaptureStatus::Ready);
    }

    #[test]
    fn test_frames_append_only_while_recording() {
        let mut state = CaptureState::new(10);
        state.mark_ready().unwrap();
        assert!(!state.record_frame(0, &sample(90.0)));
        assert_eq!(state.latest_angles, Some(sample(90.0)));

        state.start(Utc::now()).unwrap();
        assert!(state.record_frame(1, &sample(91.0)));
        assert!(state.record_frame(1, &JointAngles::default()));
        assert_eq!(state.angles.left_elbow, vec![Some(91.0), None]);
        assert_eq!(state.angles.right_elbow, vec![None, None]);

        state.stop(Utc::now()).unwrap();
        assert!(!state.record_frame(1, &sample(92.0)));
        assert_eq!(state.angles.frame_count(), 2);
    }

    #[test]
    fn test_stale_epoch_is_discarded() {
        let mut state = recording(10);
        assert!(!state.record_frame(0, &sample(90.0)));
        state.record_skipped(0);
        assert_eq!(state.frames_skipped, 0);
        assert!(state.angles.is_empty());
    }

    #[test]
    fn test_countdown_runs_out() {
        let mut state = recording(3);
        assert!(!state.tick_countdown());
        assert!(!state.tick_countdown());
        assert!(state.tick_countdown());
        assert!(state.stop(Utc::now()).unwrap());
        assert_eq!(state.snapshot().remaining_secs, 0);
        assert!(!state.tick_countdown());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut state = recording(10);
        assert!(state.stop(Utc::now()).unwrap());
        assert!(!state.stop(Utc::now()).unwrap());
        state.begin_finalize().unwrap();
        assert!(!state.stop(Utc::now()).unwrap());

        let mut ready = CaptureState::new(10);
        ready.mark_ready().unwrap();
        assert!(ready.stop(Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_policy() {
        let mut ready = CaptureState::new(10);
        ready.mark_ready().unwrap();
        ready.cancel().unwrap();
        assert_eq!(ready.status, CaptureStatus::Cancelled);
        assert!(ready.is_terminal());

        let mut failed = CaptureState::new(10);
        failed.fail("camera not available");
        failed.cancel().unwrap();

        let mut state = recording(10);
        assert!(state.cancel().is_err());
        assert_eq!(state.status, CaptureStatus::Recording);
        state.stop(Utc::now()).unwrap();
        assert!(state.cancel().is_err());
        state.begin_finalize().unwrap();
        assert!(state.cancel().is_err());
        assert_eq!(state.status, CaptureStatus::Finalizing);
    }

    #[test]
    fn test_save_failure_keeps_recording() {
        let mut state = recording(10);
        state.record_frame(1, &sample(100.0));
        state.stop(Utc::now()).unwrap();
        state.begin_finalize().unwrap();
        state.save_failed("database is locked");

        assert_eq!(state.status, CaptureStatus::Stopped);
        assert!(state.has_unsaved_recording());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.save_error.as_deref(), Some("database is locked"));
        assert_eq!(snapshot.frames_recorded, 1);

        state.begin_finalize().unwrap();
        assert_eq!(state.save_error, None);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_payload_carries_request_ids() {
        let mut state = recording(10);
        state.record_frame(1, &sample(120.0));
        let stopped_at = Utc::now();
        state.stop(stopped_at).unwrap();

        let request = CaptureRequest {
            patient_id: "pat1".into(),
            doctor_id: "doc1".into(),
            preset_id: Some("preset2".into()),
            duration_secs: 10,
        };
        let payload = state.payload(&request);
        assert_eq!(payload.patient_id, "pat1");
        assert_eq!(payload.exercise_preset_id.as_deref(), Some("preset2"));
        assert_eq!(payload.recorded_at, stopped_at);
        assert_eq!(payload.angles.left_elbow, vec![Some(120.0)]);
    }
}
