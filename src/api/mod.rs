mod qwen;

pub use qwen::QwenClient;

use crate::error::Result;
use crate::scene::SceneImage;

/// Text model that turns a script into structured scene JSON.
#[allow(async_fn_in_trait)]
pub trait ScriptModel {
    /// Returns the model's raw text answer.
    async fn complete(&self, system_instruction: &str, script: &str) -> Result<String>;
}

/// Text-to-image service. `Ok(None)` means the service answered without an image.
#[allow(async_fn_in_trait)]
pub trait ImageSynthesizer {
    async fn synthesize(&self, prompt: &str) -> Result<Option<SceneImage>>;
}
