use std::path::PathBuf;

use serde::Serialize;

use super::Scene;
use crate::error::{Result, VideoError};

/// Validated input for one end-to-end run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    script: String,
    requested_duration_secs: u32,
}

impl JobRequest {
    pub fn new(script: impl Into<String>, requested_duration_secs: u32) -> Result<Self> {
        let request = Self {
            script: script.into(),
            requested_duration_secs,
        };
        request.validate()?;
        Ok(request)
    }

    /// Builds a request from the minutes/seconds pair a user types in.
    pub fn from_parts(script: impl Into<String>, minutes: u32, seconds: u32) -> Result<Self> {
        if seconds >= 60 {
            return Err(VideoError::ValidationError(format!(
                "seconds must be below 60, got {}",
                seconds
            )));
        }
        let total = minutes
            .checked_mul(60)
            .and_then(|m| m.checked_add(seconds))
            .ok_or_else(|| VideoError::ValidationError("total duration is too large".into()))?;
        Self::new(script, total)
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn requested_duration_secs(&self) -> u32 {
        self.requested_duration_secs
    }

    /// Non-blank script and a total duration above zero.
    pub fn validate(&self) -> Result<()> {
        if self.script.trim().is_empty() {
            return Err(VideoError::ValidationError("script text is empty".into()));
        }
        if self.requested_duration_secs == 0 {
            return Err(VideoError::ValidationError(
                "total duration must be greater than 0 seconds".into(),
            ));
        }
        Ok(())
    }

    /// Skips validation so callers can check how invalid input is refused.
    #[cfg(test)]
    pub(crate) fn unchecked(script: &str, requested_duration_secs: u32) -> Self {
        Self {
            script: script.to_string(),
            requested_duration_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Analyzing,
    AcquiringImages,
    Assembling,
    Done,
    Failed,
}

impl Phase {
    /// `Idle`, `Done` and `Failed` accept a new run.
    pub fn is_at_rest(self) -> bool {
        matches!(self, Phase::Idle | Phase::Done | Phase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AcquisitionProgress {
    pub current: usize,
    pub total: usize,
}

/// The finished video file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Observable state of the current job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSnapshot {
    /// Increments on every submitted run
    pub run_id: u64,
    pub requested_duration_secs: u32,
    pub phase: Phase,
    pub scenes: Vec<Scene>,
    pub progress: AcquisitionProgress,
    /// 0..=100, meaningful while `Assembling`
    pub render_progress: u8,
    pub result: Option<VideoArtifact>,
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Fresh state for a run that is about to enter `Analyzing`.
    pub fn starting(run_id: u64, requested_duration_secs: u32) -> Self {
        Self {
            run_id,
            requested_duration_secs,
            phase: Phase::Analyzing,
            ..Self::default()
        }
    }
}
