pub mod compositor;
pub mod config;
pub mod curves;
pub mod editor;
pub mod error;
pub mod histogram;
pub mod history;
pub mod image_io;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod preview;
pub mod recipe_io;
pub mod session;
pub mod sheet;
pub mod viewport;

pub use compositor::{composite_with_retry, CompositeRequest, Compositor, UnavailableCompositor};
pub use config::{load_config, StudioConfig};
pub use curves::{build_lut, grade_image, CurveLuts};
pub use editor::CurveEditor;
pub use error::{CompositorError, PipelineError, Result, StudioError};
pub use histogram::{compute_histogram, Histogram};
pub use history::HistoryStack;
pub use image_io::{extract_crop, load_source, SourceImage};
pub use models::{
    Background, Channel, ChannelCurve, Clothing, ControlPoint, CropRegion, CurveSettings,
    ImageId, Interpolation, ViewportState,
};
pub use pipeline::{GenerateOutcome, GenerateRequest, SheetGenerator};
pub use preview::PreviewScheduler;
pub use session::EditingSession;
pub use sheet::{compose_sheet, export_sheet, SheetLayout};
pub use viewport::{compute_crop_region, CropSession};
