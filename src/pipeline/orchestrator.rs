use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{analyzer, images};
use crate::api::{ImageSynthesizer, ScriptModel};
use crate::error::{Result, VideoError};
use crate::scene::{JobRequest, JobSnapshot, Phase, VideoArtifact};
use crate::store::SceneStore;
use crate::video::{Assembler, RenderBackend};

/// Drives analyze -> acquire images -> assemble for one job at a time.
///
/// Submitting a run cancels the one in flight. A superseded run stops at its
/// next await point and never touches the published snapshot again.
pub struct Orchestrator<'a, M, S, B, D> {
    model: &'a M,
    synthesizer: &'a S,
    backend: &'a B,
    store: &'a D,
    assembler: Assembler,
    state: watch::Sender<JobSnapshot>,
    generation: AtomicU64,
    active: Mutex<Option<CancellationToken>>,
}

impl<'a, M, S, B, D> Orchestrator<'a, M, S, B, D>
where
    M: ScriptModel,
    S: ImageSynthesizer,
    B: RenderBackend,
    D: SceneStore,
{
    pub fn new(
        model: &'a M,
        synthesizer: &'a S,
        backend: &'a B,
        store: &'a D,
        assembler: Assembler,
    ) -> Self {
        let (state, _) = watch::channel(JobSnapshot::default());
        Self {
            model,
            synthesizer,
            backend,
            store,
            assembler,
            state,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state.borrow().clone()
    }

    /// True while a run is between `Analyzing` and `Assembling`.
    pub fn is_active(&self) -> bool {
        !self.state.borrow().phase.is_at_rest()
    }

    /// Validates user input and submits it. Invalid input leaves the phase untouched.
    pub async fn request_run(
        &self,
        script: &str,
        minutes: u32,
        seconds: u32,
    ) -> Result<VideoArtifact> {
        let request = JobRequest::from_parts(script, minutes, seconds)?;
        self.submit_run(request).await
    }

    /// Starts a new run, superseding any run still in flight.
    ///
    /// Returns `VideoError::Cancelled` if this run is itself superseded.
    /// An invalid request is refused before the snapshot or the run in flight
    /// are touched.
    pub async fn submit_run(&self, request: JobRequest) -> Result<VideoArtifact> {
        request.validate()?;

        let run_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.swap_token(Some(token.clone())) {
            info!("Run {} supersedes the run in flight", run_id);
            previous.cancel();
        }

        self.state
            .send_replace(JobSnapshot::starting(run_id, request.requested_duration_secs()));
        info!(
            "Run {} started: {}s requested, {} characters of script",
            run_id,
            request.requested_duration_secs(),
            request.script().len()
        );

        let outcome = AssertUnwindSafe(self.drive(run_id, &request, &token))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(VideoError::InternalError(panic_message(panic.as_ref()))));

        if self.generation.load(Ordering::SeqCst) == run_id {
            self.swap_token(None);
        }

        match &outcome {
            Ok(artifact) => {
                let artifact = artifact.clone();
                self.update(run_id, |snap| {
                    snap.phase = Phase::Done;
                    snap.result = Some(artifact);
                });
                info!("Run {} done", run_id);
            }
            Err(VideoError::Cancelled) => {
                info!("Run {} abandoned", run_id);
            }
            Err(e) => {
                let message = e.to_string();
                error!("Run {} failed: {}", run_id, message);
                self.update(run_id, |snap| {
                    snap.phase = Phase::Failed;
                    snap.error = Some(message);
                });
            }
        }
        outcome
    }

    async fn drive(
        &self,
        run_id: u64,
        request: &JobRequest,
        token: &CancellationToken,
    ) -> Result<VideoArtifact> {
        guarded(token, self.store.clear()).await?;

        let scenes = guarded(
            token,
            analyzer::analyze(self.model, request.script(), request.requested_duration_secs()),
        )
        .await?;

        let total = scenes.len();
        self.update(run_id, |snap| {
            snap.phase = Phase::AcquiringImages;
            snap.scenes = scenes.clone();
            snap.progress.total = total;
        });

        let scenes = guarded(token, async {
            let on_progress = |progress: crate::scene::AcquisitionProgress| {
                self.update(run_id, |snap| {
                    if progress.current >= snap.progress.current {
                        snap.progress = progress;
                    }
                });
            };
            Ok(images::acquire_all(self.synthesizer, scenes, &on_progress).await)
        })
        .await?;

        self.update(run_id, |snap| snap.scenes = scenes.clone());
        images::ensure_complete(&scenes)?;

        self.update(run_id, |snap| {
            snap.phase = Phase::Assembling;
            snap.render_progress = 0;
        });

        let on_render = |percent: u8| {
            self.update(run_id, |snap| {
                snap.render_progress = snap.render_progress.max(percent);
            });
        };
        // The backend watches the token itself so it can stop and clean up.
        let artifact = self
            .assembler
            .assemble(self.backend, &scenes, &on_render, token)
            .await?;

        guarded(token, self.store.bulk_put(scenes)).await?;
        Ok(artifact)
    }

    /// Applies `f` to the snapshot only while `run_id` is the current run.
    fn update(&self, run_id: u64, f: impl FnOnce(&mut JobSnapshot)) {
        self.state.send_if_modified(|snap| {
            if snap.run_id != run_id {
                return false;
            }
            f(snap);
            true
        });
    }

    fn swap_token(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        match self.active.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, token),
            Err(poisoned) => {
                warn!("Run token lock poisoned; recovering");
                std::mem::replace(&mut *poisoned.into_inner(), token)
            }
        }
    }
}

/// Races `fut` against cancellation of `token`.
async fn guarded<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(VideoError::Cancelled),
        result = fut => result,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("pipeline panicked: {}", detail)
}
