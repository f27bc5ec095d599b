use image::RgbaImage;

use crate::error::StudioError;
use crate::models::{Channel, ChannelCurve, ControlPoint, CurveSettings, Interpolation};

pub const LUT_SIZE: usize = 256;

/// `lut[input] = output`
pub type Lut = [u8; LUT_SIZE];

/// Rows graded between cooperative yields.
const ROWS_PER_YIELD: u32 = 64;

pub fn identity_lut() -> Lut {
    let mut lut = [0u8; LUT_SIZE];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = i as u8;
    }
    lut
}

fn lut_is_identity(lut: &Lut) -> bool {
    lut.iter().enumerate().all(|(i, &v)| v == i as u8)
}

/// Evaluates a curve at arbitrary input intensities.
pub struct CurveSampler<'a> {
    points: &'a [ControlPoint],
    tangents: Option<Vec<f32>>,
}

impl<'a> CurveSampler<'a> {
    pub fn new(curve: &'a ChannelCurve, interpolation: Interpolation) -> Self {
        let points = curve.points();
        let tangents = match interpolation {
            Interpolation::Linear => None,
            Interpolation::Smooth => Some(monotone_tangents(points)),
        };
        Self { points, tangents }
    }

    /// Output intensity for `x` in `[0, 255]`, clamped to `[0, 255]`.
    pub fn sample(&self, x: f32) -> f32 {
        let n = self.points.len();
        let first = self.points[0];
        let last = self.points[n - 1];
        let x = x.clamp(first.x as f32, last.x as f32);

        let k = find_interval(self.points, x);
        let p0 = self.points[k];
        let p1 = self.points[k + 1];
        let (x0, y0) = (p0.x as f32, p0.y as f32);
        let (x1, y1) = (p1.x as f32, p1.y as f32);
        let h = x1 - x0;
        let t = (x - x0) / h;

        let y = match &self.tangents {
            None => y0 + (y1 - y0) * t,
            Some(m) => {
                let t2 = t * t;
                let t3 = t2 * t;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                h00 * y0 + h10 * h * m[k] + h01 * y1 + h11 * h * m[k + 1]
            }
        };
        y.clamp(0.0, 255.0)
    }
}

/// Index `k` of the segment with `points[k].x <= x <= points[k + 1].x`.
fn find_interval(points: &[ControlPoint], x: f32) -> usize {
    let last_segment = points.len() - 2;
    let mut low = 0;
    let mut high = last_segment;
    while low < high {
        let mid = (low + high).div_ceil(2);
        if points[mid].x as f32 <= x {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

/// Fritsch-Carlson tangents. Extrema and flat segments get zero slope, so
/// curves that invert or plateau stay free of overshoot.
fn monotone_tangents(points: &[ControlPoint]) -> Vec<f32> {
    let n = points.len();
    let secants: Vec<f32> = points
        .windows(2)
        .map(|w| (w[1].y as f32 - w[0].y as f32) / (w[1].x as f32 - w[0].x as f32))
        .collect();

    let mut m = vec![0.0f32; n];
    m[0] = secants[0];
    m[n - 1] = secants[n - 2];
    for i in 1..n - 1 {
        let (d0, d1) = (secants[i - 1], secants[i]);
        if d0 == 0.0 || d1 == 0.0 || d0.signum() != d1.signum() {
            m[i] = 0.0;
        } else {
            let h0 = points[i].x as f32 - points[i - 1].x as f32;
            let h1 = points[i + 1].x as f32 - points[i].x as f32;
            let w1 = 2.0 * h1 + h0;
            let w2 = h1 + 2.0 * h0;
            m[i] = (w1 + w2) / (w1 / d0 + w2 / d1);
        }
    }

    for (i, &d) in secants.iter().enumerate() {
        if d == 0.0 {
            m[i] = 0.0;
            m[i + 1] = 0.0;
            continue;
        }
        let limit = 3.0 * d.abs();
        m[i] = m[i].clamp(-limit, limit);
        m[i + 1] = m[i + 1].clamp(-limit, limit);
    }
    m
}

pub fn build_lut(curve: &ChannelCurve, interpolation: Interpolation) -> Lut {
    if curve.is_identity() {
        return identity_lut();
    }
    let sampler = CurveSampler::new(curve, interpolation);
    let mut lut = [0u8; LUT_SIZE];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = sampler.sample(i as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Points for drawing the curve, `samples` evenly spaced over `[0, 255]`.
pub fn polyline(
    curve: &ChannelCurve,
    interpolation: Interpolation,
    samples: usize,
) -> Vec<(f32, f32)> {
    let sampler = CurveSampler::new(curve, interpolation);
    let samples = samples.max(2);
    (0..samples)
        .map(|i| {
            let x = 255.0 * i as f32 / (samples - 1) as f32;
            (x, sampler.sample(x))
        })
        .collect()
}

/// Per-channel tables with `all` already folded into each colour channel.
#[derive(Debug, Clone)]
pub struct CurveLuts {
    pub all: Lut,
    pub red: Lut,
    pub green: Lut,
    pub blue: Lut,
    composed: [Lut; 3],
}

impl CurveLuts {
    pub fn from_settings(settings: &CurveSettings) -> Self {
        let interp = settings.interpolation;
        let all = build_lut(&settings.all, interp);
        let red = build_lut(&settings.red, interp);
        let green = build_lut(&settings.green, interp);
        let blue = build_lut(&settings.blue, interp);

        let compose = |channel: &Lut| {
            let mut out = [0u8; LUT_SIZE];
            for (v, o) in out.iter_mut().enumerate() {
                *o = channel[all[v] as usize];
            }
            out
        };
        let composed = [compose(&red), compose(&green), compose(&blue)];

        Self {
            all,
            red,
            green,
            blue,
            composed,
        }
    }

    pub fn channel(&self, channel: Channel) -> &Lut {
        match channel {
            Channel::All => &self.all,
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.composed.iter().all(lut_is_identity)
    }

    /// `r' = red[all[r]]`, likewise for green and blue. Alpha is untouched.
    pub fn apply_rgba_in_place(&self, data: &mut [u8]) {
        if self.is_identity() {
            return;
        }
        let [r_lut, g_lut, b_lut] = &self.composed;
        for px in data.chunks_exact_mut(4) {
            px[0] = r_lut[px[0] as usize];
            px[1] = g_lut[px[1] as usize];
            px[2] = b_lut[px[2] as usize];
        }
    }
}

pub fn grade_image(img: &RgbaImage, settings: &CurveSettings) -> RgbaImage {
    let luts = CurveLuts::from_settings(settings);
    let mut out = img.clone();
    luts.apply_rgba_in_place(&mut out);
    out
}

/// Same output as [`grade_image`], yielding to the runtime between row bands.
pub async fn grade_image_cooperative(
    img: &RgbaImage,
    settings: &CurveSettings,
) -> Result<RgbaImage, StudioError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(StudioError::EmptyImage);
    }
    let luts = CurveLuts::from_settings(settings);
    let mut out = img.clone();
    if luts.is_identity() {
        return Ok(out);
    }
    let band = (w as usize) * 4 * ROWS_PER_YIELD as usize;
    for chunk in out.chunks_mut(band) {
        luts.apply_rgba_in_place(chunk);
        tokio::task::yield_now().await;
    }
    Ok(out)
}
