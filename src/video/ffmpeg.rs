use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::assembler::RenderJob;
use super::{BackendState, RenderBackend};
use crate::error::{Result, VideoError};
use crate::scene::VideoArtifact;

const OUTPUT_FILE: &str = "output.mp4";

/// Images written for one render. Removed on drop, including when the render
/// future itself is dropped mid-flight.
struct StagedInputs(Vec<PathBuf>);

impl Drop for StagedInputs {
    fn drop(&mut self) {
        for path in &self.0 {
            std::fs::remove_file(path).ok();
        }
    }
}

/// Renders through the system `ffmpeg` binary.
///
/// Created once at startup and shared by reference. Inputs are staged in
/// `work_dir`, so renders are serialized by an async lock.
pub struct FfmpegBackend {
    program: PathBuf,
    work_dir: PathBuf,
    state: watch::Sender<BackendState>,
    render_lock: Mutex<()>,
}

impl FfmpegBackend {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_program("ffmpeg", work_dir)
    }

    pub fn with_program(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(BackendState::Uninitialized);
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
            state,
            render_lock: Mutex::new(()),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BackendState> {
        self.state.subscribe()
    }

    /// Probes the binary and prepares the staging directory.
    pub async fn init(&self) -> BackendState {
        let state = match self.probe().await {
            Ok(()) => BackendState::Ready,
            Err(e) => {
                error!("ffmpeg backend unavailable: {}", e);
                BackendState::Unavailable(e.to_string())
            }
        };
        if state == BackendState::Ready {
            info!("ffmpeg backend ready ({})", self.program.display());
        }
        self.state.send_replace(state.clone());
        state
    }

    async fn probe(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                VideoError::RenderError(format!(
                    "failed to run {} (is it installed and on PATH?): {}",
                    self.program.display(),
                    e
                ))
            })?;
        if !status.success() {
            return Err(VideoError::RenderError(format!(
                "{} -version exited with status {}",
                self.program.display(),
                status
            )));
        }
        tokio::fs::create_dir_all(&self.work_dir).await?;
        Ok(())
    }

    async fn stage_inputs(&self, job: &RenderJob<'_>) -> Result<StagedInputs> {
        let mut staged = StagedInputs(Vec::with_capacity(job.inputs.len()));
        for (i, input) in job.inputs.iter().enumerate() {
            let path = self
                .work_dir
                .join(format!("img{}.{}", i, input.image.extension()));
            tokio::fs::write(&path, &input.image.data).await?;
            staged.0.push(path);
        }
        Ok(staged)
    }

    async fn run(
        &self,
        args: Vec<String>,
        total_duration: f64,
        progress: &dyn Fn(f64),
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VideoError::RenderError(format!("Failed to run FFmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::RenderError("failed to open ffmpeg stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| VideoError::RenderError("failed to open ffmpeg stderr".into()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.ok();
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    child.kill().await.ok();
                    return Err(VideoError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(fraction) = parse_progress_line(&line, total_duration) {
                            progress(fraction);
                        }
                    }
                    None => break,
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                return Err(VideoError::Cancelled);
            }
            status = child.wait() => status?,
        };
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            return Err(VideoError::RenderError(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Command line for one render: looped stills, crossfade graph, duration clamp.
pub fn command_args(job: &RenderJob<'_>, staged: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    for (input, path) in job.inputs.iter().zip(staged) {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            input.hold_secs.to_string(),
            "-i".to_string(),
            path.display().to_string(),
        ]);
    }
    args.extend([
        "-filter_complex".to_string(),
        job.filter_graph.clone(),
        "-t".to_string(),
        job.total_duration.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// Reads one `-progress` line as a fraction of `total_duration`.
pub fn parse_progress_line(line: &str, total_duration: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports microseconds under both keys.
        "out_time_us" | "out_time_ms" => {
            let micros: f64 = value.trim().parse().ok()?;
            if total_duration <= 0.0 || micros < 0.0 {
                return None;
            }
            Some((micros / 1_000_000.0 / total_duration).min(1.0))
        }
        "progress" if value.trim() == "end" => Some(1.0),
        _ => None,
    }
}

impl RenderBackend for FfmpegBackend {
    fn state(&self) -> BackendState {
        self.state.borrow().clone()
    }

    async fn render(
        &self,
        job: &RenderJob<'_>,
        progress: &dyn Fn(f64),
        cancel: &CancellationToken,
    ) -> Result<VideoArtifact> {
        if !self.is_ready() {
            return Err(VideoError::RenderError(
                "ffmpeg backend is not initialized".into(),
            ));
        }

        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(VideoError::Cancelled),
            guard = self.render_lock.lock() => guard,
        };

        let output = self.work_dir.join(OUTPUT_FILE);
        tokio::fs::remove_file(&output).await.ok();

        let staged = self.stage_inputs(job).await?;
        let args = command_args(job, &staged.0, &output);
        let outcome = self.run(args, job.total_duration, progress, cancel).await;
        drop(staged);
        outcome?;

        info!("Rendered video: {}", output.display());
        Ok(VideoArtifact {
            path: output,
            duration_secs: job.total_duration,
        })
    }
}
