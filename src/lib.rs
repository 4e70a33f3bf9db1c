//! Script-to-video pipeline: split a script into timed scenes, synthesize one
//! image per scene, and render the stills into a single crossfaded video.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scene;
pub mod store;
pub mod trigger;
pub mod video;

pub use config::PipelineConfig;
pub use error::{Result, VideoError};
pub use pipeline::Orchestrator;
pub use scene::{JobRequest, JobSnapshot, Phase, Scene, Transition, VideoArtifact};
