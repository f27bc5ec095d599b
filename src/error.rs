use std::path::PathBuf;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to encode PNG: {0}")]
    Encode(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("EXIF read error: {0}")]
    Exif(#[from] exif::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Sheet layout impossible: {0}")]
    Layout(String),

    #[error("Invalid curve: {0}")]
    InvalidCurve(String),

    #[error("A control point is being dragged")]
    DragInProgress,

    #[error("Unable to resolve {0} directory")]
    MissingDir(&'static str),

    #[error(transparent)]
    Compositor(#[from] CompositorError),
}

impl StudioError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StudioError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by the remote background/clothing compositor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositorError {
    #[error("Compositor rate limit hit")]
    RateLimited,

    #[error("Compositor failed: {0}")]
    Failed(String),

    #[error("Compositor still rate limited after {0} retries")]
    RetriesExhausted(u32),
}

/// Failures of a whole "Generate" run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("A sheet is already being generated for this session")]
    Busy,

    #[error("Sheet generation failed: {0}")]
    Fatal(#[source] StudioError),
}

pub type Result<T, E = StudioError> = std::result::Result<T, E>;
