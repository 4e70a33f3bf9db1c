mod assembler;
mod ffmpeg;
mod timeline;

pub use assembler::{Assembler, RenderInput, RenderJob};
pub use ffmpeg::{command_args, parse_progress_line, FfmpegBackend};
pub use timeline::{Crossfade, StillInput, Timeline};

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::scene::VideoArtifact;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    Uninitialized,
    Ready,
    Unavailable(String),
}

/// Turns a [`RenderJob`] into a video file.
#[allow(async_fn_in_trait)]
pub trait RenderBackend {
    fn state(&self) -> BackendState;

    fn is_ready(&self) -> bool {
        self.state() == BackendState::Ready
    }

    /// Renders the job, reporting completion as a 0.0..=1.0 fraction.
    async fn render(
        &self,
        job: &RenderJob<'_>,
        progress: &dyn Fn(f64),
        cancel: &CancellationToken,
    ) -> Result<VideoArtifact>;
}
