use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{CompositorError, Result};
use crate::image_io::{encode_png_fast, png_data_uri};
use crate::models::{Background, Clothing};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRequest {
    /// `data:image/png;base64,...`
    pub image_data_uri: String,
    pub background: Background,
    pub clothing: Clothing,
}

impl CompositeRequest {
    pub fn from_photo(photo: &RgbaImage, background: Background, clothing: Clothing) -> Result<Self> {
        let png = encode_png_fast(photo)?;
        Ok(Self {
            image_data_uri: png_data_uri(&png),
            background,
            clothing,
        })
    }
}

/// Whether the selectors ask the compositor to change anything at all.
pub fn wants_compositing(background: Background, clothing: Clothing) -> bool {
    background != Background::Unchanged || clothing != Clothing::None
}

/// Remote compositor. Implementations return the new raster as PNG bytes
/// and report rate limiting as [`CompositorError::RateLimited`].
#[allow(async_fn_in_trait)]
pub trait Compositor {
    async fn composite(&self, request: &CompositeRequest) -> Result<Vec<u8>, CompositorError>;
}

/// Stand-in used when no remote compositor is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCompositor;

impl Compositor for UnavailableCompositor {
    async fn composite(&self, _request: &CompositeRequest) -> Result<Vec<u8>, CompositorError> {
        Err(CompositorError::Failed(
            "no AI compositor is configured".to_string(),
        ))
    }
}

/// Calls the compositor, backing off `base, 2x base, 4x base...` after each
/// rate-limit response for at most `policy.max_retries` retries. Any other
/// failure is returned immediately.
pub async fn composite_with_retry<C: Compositor>(
    compositor: &C,
    request: &CompositeRequest,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, CompositorError> {
    let mut retry = 0;
    loop {
        match compositor.composite(request).await {
            Ok(png) => {
                debug!(retries = retry, bytes = png.len(), "compositor succeeded");
                return Ok(png);
            }
            Err(CompositorError::RateLimited) if retry < policy.max_retries => {
                let delay = policy.delay(retry);
                warn!(
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    "compositor rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(CompositorError::RateLimited) => {
                return Err(CompositorError::RetriesExhausted(policy.max_retries));
            }
            Err(other) => return Err(other),
        }
    }
}
