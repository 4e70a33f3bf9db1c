use std::path::PathBuf;
use std::time::Duration;

/// Length of every crossfade between adjacent scenes.
pub const DEFAULT_CROSSFADE_SECS: f64 = 1.0;

/// Quiet period before an edited script triggers a new run.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Tunables shared by the API client, the render backend and the CLI driver.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    pub crossfade_secs: f64,
    pub text_model: String,
    pub image_model: String,
    pub image_size: String,
    pub image_poll_interval: Duration,
    pub image_max_polls: u32,
    pub http_timeout: Duration,
    pub debounce: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./output"),
            crossfade_secs: DEFAULT_CROSSFADE_SECS,
            text_model: "qwen-plus".to_string(),
            image_model: "wanx-v1".to_string(),
            image_size: "1280*720".to_string(),
            image_poll_interval: Duration::from_secs(5),
            image_max_polls: 60,
            http_timeout: Duration::from_secs(300),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl PipelineConfig {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_crossfade(mut self, crossfade_secs: f64) -> Self {
        self.crossfade_secs = crossfade_secs;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}
