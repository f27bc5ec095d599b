use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{imageops, RgbaImage};
use tracing::{info, warn};

use crate::compositor::{composite_with_retry, wants_compositing, CompositeRequest, Compositor};
use crate::config::{RetryPolicy, SheetConfig};
use crate::curves::grade_image_cooperative;
use crate::error::{PipelineError, StudioError};
use crate::image_io::decode_png;
use crate::models::{Background, Clothing, CurveSettings};
use crate::sheet::compose_sheet;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Committed crop at full resolution.
    pub photo: Arc<RgbaImage>,
    pub curves: CurveSettings,
    pub background: Background,
    pub clothing: Clothing,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub sheet: RgbaImage,
    /// The single photo that was tiled onto the sheet.
    pub photo: RgbaImage,
    pub ai_applied: bool,
    /// Set when AI enhancement was requested but the plain photo was used.
    pub warning: Option<String>,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Crop -> grade -> optional AI composite -> sheet, one run at a time.
pub struct SheetGenerator<C> {
    compositor: C,
    sheet: SheetConfig,
    retry: RetryPolicy,
    in_flight: AtomicBool,
}

impl<C: Compositor> SheetGenerator<C> {
    pub fn new(compositor: C, sheet: SheetConfig, retry: RetryPolicy) -> Self {
        Self {
            compositor,
            sheet,
            retry,
            in_flight: AtomicBool::new(false),
        }
    }

    /// While true the "Generate" action should be disabled.
    pub fn is_generating(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn enhance(&self, graded: &RgbaImage, request: &GenerateRequest) -> Result<RgbaImage, StudioError> {
        let composite_request =
            CompositeRequest::from_photo(graded, request.background, request.clothing)?;
        let png = composite_with_retry(&self.compositor, &composite_request, &self.retry).await?;
        let mut enhanced = decode_png(&png)?;
        if enhanced.dimensions() != graded.dimensions() {
            enhanced = imageops::resize(
                &enhanced,
                graded.width(),
                graded.height(),
                imageops::FilterType::Lanczos3,
            );
        }
        Ok(enhanced)
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutcome, PipelineError> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or(PipelineError::Busy)?;

        let graded = grade_image_cooperative(&request.photo, &request.curves)
            .await
            .map_err(PipelineError::Fatal)?;
        info!(width = graded.width(), height = graded.height(), "photo graded");

        let mut warning = None;
        let mut ai_applied = false;
        let photo = if wants_compositing(request.background, request.clothing) {
            match self.enhance(&graded, &request).await {
                Ok(enhanced) => {
                    ai_applied = true;
                    info!(background = ?request.background, clothing = ?request.clothing, "AI composite applied");
                    enhanced
                }
                Err(e) => {
                    warn!("AI enhancement failed, using graded photo: {e}");
                    warning = Some(format!("AI enhancement failed, plain photo used ({e})"));
                    graded
                }
            }
        } else {
            graded
        };

        let sheet = compose_sheet(&photo, &self.sheet).map_err(PipelineError::Fatal)?;
        Ok(GenerateOutcome {
            sheet,
            photo,
            ai_applied,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::UnavailableCompositor;
    use crate::error::CompositorError;
    use crate::image_io::encode_png_fast;
    use crate::models::{ChannelCurve, ControlPoint};
    use image::Rgba;
    use std::time::Duration;

    struct Recolor(Rgba<u8>);

    impl Compositor for Recolor {
        async fn composite(&self, request: &CompositeRequest) -> Result<Vec<u8>, CompositorError> {
            assert!(request.image_data_uri.starts_with("data:image/png;base64,"));
            let out = RgbaImage::from_pixel(70, 90, self.0);
            encode_png_fast(&out).map_err(|e| CompositorError::Failed(e.to_string()))
        }
    }

    struct AlwaysLimited;

    impl Compositor for AlwaysLimited {
        async fn composite(&self, _request: &CompositeRequest) -> Result<Vec<u8>, CompositorError> {
            Err(CompositorError::RateLimited)
        }
    }

    struct Slow;

    impl Compositor for Slow {
        async fn composite(&self, request: &CompositeRequest) -> Result<Vec<u8>, CompositorError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Recolor(Rgba([0, 0, 255, 255])).composite(request).await
        }
    }

    fn request(background: Background) -> GenerateRequest {
        GenerateRequest {
            photo: Arc::new(RgbaImage::from_pixel(35, 45, Rgba([100, 100, 100, 255]))),
            curves: CurveSettings {
                all: ChannelCurve::new(vec![ControlPoint::new(0, 255), ControlPoint::new(255, 0)])
                    .unwrap(),
                ..CurveSettings::default()
            },
            background,
            clothing: Clothing::None,
        }
    }

    fn generator<C: Compositor>(c: C) -> SheetGenerator<C> {
        SheetGenerator::new(c, SheetConfig::default(), RetryPolicy::default())
    }

    #[tokio::test]
    async fn plain_run_grades_and_tiles() {
        let out = generator(UnavailableCompositor)
            .generate(request(Background::Unchanged))
            .await
            .unwrap();
        assert!(out.warning.is_none());
        assert!(!out.ai_applied);
        assert_eq!(out.photo.get_pixel(0, 0), &Rgba([155, 155, 155, 255]));
        assert_eq!(out.sheet.dimensions(), (1524, 1016));
    }

    #[tokio::test]
    async fn successful_composite_is_used() {
        let out = generator(Recolor(Rgba([0, 0, 255, 255])))
            .generate(request(Background::Blue))
            .await
            .unwrap();
        assert!(out.ai_applied);
        assert!(out.warning.is_none());
        assert_eq!(out.photo.dimensions(), (35, 45));
        assert_eq!(out.photo.get_pixel(10, 10), &Rgba([0, 0, 255, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_with_warning() {
        let out = generator(AlwaysLimited)
            .generate(request(Background::White))
            .await
            .unwrap();
        assert!(!out.ai_applied);
        let warning = out.warning.unwrap();
        assert!(warning.starts_with("AI enhancement failed, plain photo used"));
        assert_eq!(out.photo.get_pixel(0, 0), &Rgba([155, 155, 155, 255]));
        assert_eq!(out.sheet.dimensions(), (1524, 1016));
    }

    #[tokio::test]
    async fn impossible_sheet_is_fatal() {
        let gen = SheetGenerator::new(
            UnavailableCompositor,
            SheetConfig {
                copies: 100,
                ..SheetConfig::default()
            },
            RetryPolicy::default(),
        );
        let err = gen.generate(request(Background::Unchanged)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fatal(StudioError::Layout(_))));
        assert!(err.to_string().starts_with("Sheet generation failed"));
        assert!(!gen.is_generating());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_generate_is_rejected() {
        let gen = generator(Slow);
        let (first, second) = tokio::join!(
            gen.generate(request(Background::Blue)),
            gen.generate(request(Background::Blue))
        );
        assert!(first.unwrap().ai_applied);
        assert!(matches!(second, Err(PipelineError::Busy)));
        assert!(!gen.is_generating());
        assert!(gen.generate(request(Background::Unchanged)).await.is_ok());
    }
}
