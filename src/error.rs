use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Script analysis error: {0}")]
    AnalysisError(String),

    #[error("Script produced no scenes; try a more detailed script")]
    EmptyScriptError,

    #[error("{missing} of {total} scene images could not be generated")]
    IncompleteImageSetError { missing: usize, total: usize },

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Run was superseded by a newer run")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Scene store error: {0}")]
    StoreError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl VideoError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VideoError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_image_set_reports_counts() {
        let err = VideoError::IncompleteImageSetError {
            missing: 2,
            total: 5,
        };
        assert_eq!(err.to_string(), "2 of 5 scene images could not be generated");
    }

    #[test]
    fn render_error_keeps_backend_diagnostic() {
        let err = VideoError::RenderError("ffmpeg exited with status 1: bad input".into());
        assert!(err.to_string().contains("bad input"));
        assert!(!err.is_cancelled());
        assert!(VideoError::Cancelled.is_cancelled());
    }
}
