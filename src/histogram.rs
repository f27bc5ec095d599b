use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use image::RgbaImage;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::debug;

use crate::models::ImageId;

pub const BINS: usize = 256;
const HISTOGRAM_CACHE_IMAGES: usize = 8;
const ROWS_PER_YIELD: u32 = 128;

/// Raw per-channel intensity counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub red: [u32; BINS],
    pub green: [u32; BINS],
    pub blue: [u32; BINS],
    pub luminance: [u32; BINS],
    pub pixel_count: u64,
}

/// Every channel scaled so its tallest bin is 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedHistogram {
    pub red: Vec<f32>,
    pub green: Vec<f32>,
    pub blue: Vec<f32>,
    pub luminance: Vec<f32>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            red: [0; BINS],
            green: [0; BINS],
            blue: [0; BINS],
            luminance: [0; BINS],
            pixel_count: 0,
        }
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn normalize(bins: &[u32; BINS]) -> Vec<f32> {
    let max = bins.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0.0; BINS];
    }
    bins.iter().map(|&v| v as f32 / max as f32).collect()
}

impl Histogram {
    fn accumulate(&mut self, rgba: &[u8]) {
        for px in rgba.chunks_exact(4) {
            self.red[px[0] as usize] += 1;
            self.green[px[1] as usize] += 1;
            self.blue[px[2] as usize] += 1;
            self.luminance[luminance(px[0], px[1], px[2]) as usize] += 1;
            self.pixel_count += 1;
        }
    }

    pub fn max_value(&self) -> u32 {
        [&self.red, &self.green, &self.blue, &self.luminance]
            .iter()
            .flat_map(|bins| bins.iter().copied())
            .max()
            .unwrap_or(0)
    }

    pub fn normalized(&self) -> NormalizedHistogram {
        NormalizedHistogram {
            red: normalize(&self.red),
            green: normalize(&self.green),
            blue: normalize(&self.blue),
            luminance: normalize(&self.luminance),
        }
    }

    pub fn has_shadow_clipping(&self) -> bool {
        self.red[0] > 0 || self.green[0] > 0 || self.blue[0] > 0
    }

    pub fn has_highlight_clipping(&self) -> bool {
        self.red[BINS - 1] > 0 || self.green[BINS - 1] > 0 || self.blue[BINS - 1] > 0
    }
}

/// Single pass over the raster; alpha is ignored.
pub fn compute_histogram(img: &RgbaImage) -> Histogram {
    let mut hist = Histogram::default();
    hist.accumulate(img.as_raw());
    hist
}

/// [`compute_histogram`] that yields to the runtime between row bands, so
/// curve edits keep flowing while it runs.
pub async fn compute_histogram_cooperative(img: &RgbaImage) -> Histogram {
    let mut hist = Histogram::default();
    let band = (img.width() as usize * 4 * ROWS_PER_YIELD as usize).max(4);
    for chunk in img.as_raw().chunks(band) {
        hist.accumulate(chunk);
        tokio::task::yield_now().await;
    }
    hist
}

/// Bounded LRU of histograms keyed by image identity.
pub struct HistogramCache {
    entries: DashMap<ImageId, Arc<Histogram>>,
    lru: Mutex<VecDeque<ImageId>>,
    capacity: usize,
}

impl HistogramCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            lru: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: &ImageId) -> Option<Arc<Histogram>> {
        let hit = self.entries.get(id).map(|entry| entry.value().clone());
        if hit.is_some() {
            self.touch(id);
        }
        hit
    }

    pub fn insert(&self, id: ImageId, hist: Arc<Histogram>) {
        self.entries.insert(id, hist);
        self.touch(&id);
        self.evict_if_needed();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        if let Ok(mut lru) = self.lru.lock() {
            lru.clear();
        }
    }

    fn touch(&self, id: &ImageId) {
        if let Ok(mut lru) = self.lru.lock() {
            if let Some(pos) = lru.iter().position(|existing| existing == id) {
                lru.remove(pos);
            }
            lru.push_back(*id);
        }
    }

    fn evict_if_needed(&self) {
        let mut evicted: Vec<ImageId> = Vec::new();
        if let Ok(mut lru) = self.lru.lock() {
            while lru.len() > self.capacity {
                match lru.pop_front() {
                    Some(id) => evicted.push(id),
                    None => break,
                }
            }
        }
        for id in evicted {
            self.entries.remove(&id);
        }
    }

    /// Cached histogram for `id`, computing it on a miss.
    pub async fn histogram_for(&self, id: ImageId, img: &RgbaImage) -> Arc<Histogram> {
        if let Some(hit) = self.get(&id) {
            debug!(image = %id, "histogram cache hit");
            return hit;
        }
        let hist = Arc::new(compute_histogram_cooperative(img).await);
        debug!(image = %id, pixels = hist.pixel_count, "histogram computed");
        self.insert(id, hist.clone());
        hist
    }
}

pub static HISTOGRAMS: Lazy<HistogramCache> =
    Lazy::new(|| HistogramCache::new(HISTOGRAM_CACHE_IMAGES));

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    #[test]
    fn counts_each_channel_once_per_pixel() {
        let img = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => Rgba([255, 0, 0, 255]),
            1 => Rgba([0, 255, 0, 10]),
            _ => Rgba([128, 128, 128, 0]),
        });
        let hist = compute_histogram(&img);
        assert_eq!(hist.pixel_count, 3);
        assert_eq!(hist.red[255], 1);
        assert_eq!(hist.red[0], 1);
        assert_eq!(hist.red[128], 1);
        assert_eq!(hist.green[255], 1);
        assert_eq!(hist.luminance[128], 1);
        assert!(hist.has_highlight_clipping());
        assert!(hist.has_shadow_clipping());
    }

    #[test]
    fn normalized_peak_is_one() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([100, 50, 25, 255]));
        img.put_pixel(0, 0, Rgba([200, 50, 25, 255]));
        let norm = compute_histogram(&img).normalized();
        assert_eq!(norm.red[100], 1.0);
        assert!((norm.red[200] - 1.0 / 15.0).abs() < 1e-6);
        assert_eq!(norm.green[50], 1.0);
        assert_eq!(norm.red.len(), BINS);
    }

    #[test]
    fn empty_image_normalizes_to_zero() {
        let norm = compute_histogram(&RgbaImage::new(0, 0)).normalized();
        assert!(norm.luminance.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn cache_reuses_and_evicts() {
        let cache = HistogramCache::new(2);
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let a = ImageId::new();
        let first = cache.histogram_for(a, &img).await;
        let again = cache.histogram_for(a, &RgbaImage::new(1, 1)).await;
        assert!(Arc::ptr_eq(&first, &again));

        let b = ImageId::new();
        let c = ImageId::new();
        cache.histogram_for(b, &img).await;
        cache.histogram_for(c, &img).await;
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[tokio::test]
    async fn cooperative_matches_single_pass() {
        let img = RgbaImage::from_fn(7, 300, |x, y| Rgba([x as u8, y as u8, (x * y) as u8, 255]));
        assert_eq!(compute_histogram(&img), compute_histogram_cooperative(&img).await);
    }

    proptest! {
        #[test]
        fn totals_equal_pixel_count(w in 1u32..12, h in 1u32..12, seed in any::<u8>()) {
            let img = RgbaImage::from_fn(w, h, |x, y| {
                Rgba([seed.wrapping_add(x as u8), (y as u8).wrapping_mul(seed), seed, 255])
            });
            let hist = compute_histogram(&img);
            let total: u64 = hist.red.iter().map(|&c| c as u64).sum();
            prop_assert_eq!(total, (w * h) as u64);
            let norm = hist.normalized();
            let peak = norm.blue.iter().cloned().fold(0.0f32, f32::max);
            prop_assert_eq!(peak, 1.0);
        }
    }
}
