use tracing::debug;

use crate::config::ViewportConfig;
use crate::models::{CropRegion, Offset, Size, ViewportState};

pub const CROP_ASPECT_W: f64 = 35.0;
pub const CROP_ASPECT_H: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub width: f64,
    pub height: f64,
}

impl CropBox {
    /// Largest 35:45 box that fits in `fill` of the container.
    pub fn fit(container: Size, fill: f64) -> Self {
        let avail_w = container.width * fill;
        let avail_h = container.height * fill;
        let height = avail_h.min(avail_w * CROP_ASPECT_H / CROP_ASPECT_W);
        let width = height * CROP_ASPECT_W / CROP_ASPECT_H;
        Self { width, height }
    }

    pub fn origin(&self, container: Size) -> Offset {
        Offset::new(
            (container.width - self.width) / 2.0,
            (container.height - self.height) / 2.0,
        )
    }
}

/// Rotation normalised to `[0, 360)`.
pub fn normalize_rotation(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Pixel size of the axis-aligned box holding a `w` x `h` raster rotated by
/// `deg`. Quarter turns are exact.
pub fn rotated_bounds(w: u32, h: u32, deg: f64) -> (u32, u32) {
    let deg = normalize_rotation(deg);
    if deg == 0.0 || deg == 180.0 {
        return (w, h);
    }
    if deg == 90.0 || deg == 270.0 {
        return (h, w);
    }
    let (sin, cos) = deg.to_radians().sin_cos();
    let (w, h) = (w as f64, h as f64);
    let bw = (w * cos.abs() + h * sin.abs()).round().max(1.0);
    let bh = (w * sin.abs() + h * cos.abs()).round().max(1.0);
    (bw as u32, bh as u32)
}

fn clamp_span(start: f64, len: f64, limit: u32) -> (u32, u32) {
    let limit_f = limit as f64;
    let lo = start.round().clamp(0.0, limit_f);
    let hi = (start + len).round().clamp(0.0, limit_f);
    let mut lo = lo as u32;
    let mut len = (hi as u32).saturating_sub(lo);
    if len == 0 {
        len = 1.min(limit);
        lo = lo.min(limit.saturating_sub(len));
    }
    (lo, len)
}

/// Maps viewport state onto a source-pixel rectangle. Regions falling outside
/// the source are clamped to its bounds and never collapse below 1x1.
pub fn compute_crop_region(
    natural_w: u32,
    natural_h: u32,
    container: Size,
    crop_box: CropBox,
    state: &ViewportState,
) -> CropRegion {
    let rotation_deg = normalize_rotation(state.rotation_deg);
    let (frame_w, frame_h) = rotated_bounds(natural_w, natural_h, rotation_deg);
    let zoom = if state.zoom.is_finite() && state.zoom > 0.0 {
        state.zoom
    } else {
        1.0
    };

    let rendered_w = frame_w as f64 * zoom;
    let rendered_h = frame_h as f64 * zoom;
    let image_left = (container.width - rendered_w) / 2.0 + state.pan_offset.x;
    let image_top = (container.height - rendered_h) / 2.0 + state.pan_offset.y;
    let box_origin = crop_box.origin(container);

    let scale = frame_w as f64 / rendered_w;
    let x = (box_origin.x - image_left) * scale;
    let y = (box_origin.y - image_top) * scale;
    let w = crop_box.width * scale;
    let h = crop_box.height * scale;

    let (x, width) = clamp_span(x, w, frame_w);
    let (y, height) = clamp_span(y, h, frame_h);
    CropRegion {
        x,
        y,
        width,
        height,
        rotation_deg,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging {
        start_pointer: Offset,
        start_pan: Offset,
    },
}

/// One cropping session over a single source image. `commit` and `cancel`
/// consume the session.
#[derive(Debug, Clone)]
pub struct CropSession {
    natural_w: u32,
    natural_h: u32,
    container: Size,
    crop_box: CropBox,
    config: ViewportConfig,
    state: ViewportState,
    phase: DragPhase,
}

impl CropSession {
    /// Starts a session already auto-framed for the given source size.
    pub fn new(natural_w: u32, natural_h: u32, config: &ViewportConfig) -> Self {
        let container = Size::new(config.container_width, config.container_height);
        let mut session = Self {
            natural_w,
            natural_h,
            container,
            crop_box: CropBox::fit(container, config.crop_box_fill),
            config: config.clone(),
            state: ViewportState::default(),
            phase: DragPhase::Idle,
        };
        session.auto_frame();
        session
    }

    /// Head-and-shoulders framing: over-fill the box, then lift the image.
    pub fn auto_frame(&mut self) {
        let nw = self.natural_w.max(1) as f64;
        let nh = self.natural_h.max(1) as f64;
        let width_zoom = self.crop_box.width * self.config.width_overfill / nw;
        let height_zoom = self.crop_box.height * self.config.height_overfill / nh;
        let zoom = width_zoom
            .max(height_zoom)
            .min(self.config.max_zoom)
            .max(self.config.min_zoom);
        self.state = ViewportState {
            zoom,
            rotation_deg: 0.0,
            pan_offset: Offset::new(0.0, -self.config.vertical_bias * nh * zoom),
        };
        self.phase = DragPhase::Idle;
        debug!(zoom, pan_y = self.state.pan_offset.y, "auto-framed crop session");
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn crop_box(&self) -> CropBox {
        self.crop_box
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn natural_size(&self) -> (u32, u32) {
        (self.natural_w, self.natural_h)
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging { .. })
    }

    pub fn begin_drag(&mut self, pointer: Offset) {
        self.phase = DragPhase::Dragging {
            start_pointer: pointer,
            start_pan: self.state.pan_offset,
        };
    }

    /// Pan follows the pointer delta since `begin_drag`; ignored while idle.
    pub fn drag_to(&mut self, pointer: Offset) {
        if let DragPhase::Dragging {
            start_pointer,
            start_pan,
        } = self.phase
        {
            self.state.pan_offset = Offset::new(
                start_pan.x + (pointer.x - start_pointer.x),
                start_pan.y + (pointer.y - start_pointer.y),
            );
        }
    }

    pub fn end_drag(&mut self) {
        self.phase = DragPhase::Idle;
    }

    pub fn set_pan(&mut self, pan: Offset) {
        self.state.pan_offset = pan;
    }

    /// Clamped to the configured zoom range; non-finite input is ignored.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.state.zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        }
    }

    pub fn set_rotation(&mut self, deg: f64) {
        self.state.rotation_deg = if deg.is_finite() { deg } else { 0.0 };
    }

    /// Quick-step buttons (+-90, +-180) add to the current rotation.
    pub fn rotate_by(&mut self, step_deg: f64) {
        self.set_rotation(self.state.rotation_deg + step_deg);
    }

    /// Numeric field entry. Anything that does not parse resets to 0.
    pub fn set_rotation_text(&mut self, text: &str) {
        let deg = text.trim().parse::<f64>().unwrap_or(0.0);
        self.set_rotation(deg);
    }

    pub fn display_rotation(&self) -> f64 {
        normalize_rotation(self.state.rotation_deg)
    }

    pub fn crop_region(&self) -> CropRegion {
        compute_crop_region(
            self.natural_w,
            self.natural_h,
            self.container,
            self.crop_box,
            &self.state,
        )
    }

    pub fn commit(self) -> CropRegion {
        let region = self.crop_region();
        debug!(
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            rotation = region.rotation_deg,
            "crop committed"
        );
        region
    }

    pub fn cancel(self) {
        debug!("crop session cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(container_w: f64, container_h: f64) -> ViewportConfig {
        ViewportConfig {
            container_width: container_w,
            container_height: container_h,
            crop_box_fill: 0.75,
            ..ViewportConfig::default()
        }
    }

    fn reset(session: &mut CropSession) {
        session.set_zoom(1.0);
        session.set_rotation(0.0);
        session.set_pan(Offset::ZERO);
    }

    #[test]
    fn crop_box_keeps_passport_aspect() {
        let b = CropBox::fit(Size::new(500.0, 600.0), 0.75);
        assert_eq!((b.width, b.height), (350.0, 450.0));
        let wide = CropBox::fit(Size::new(2000.0, 400.0), 1.0);
        assert!((wide.width / wide.height - 35.0 / 45.0).abs() < 1e-12);
        assert_eq!(wide.height, 400.0);
    }

    #[test]
    fn unit_view_of_box_sized_image_is_full_frame() {
        let mut session = CropSession::new(350, 450, &config(500.0, 600.0));
        reset(&mut session);
        let region = session.commit();
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 0,
                width: 350,
                height: 450,
                rotation_deg: 0.0
            }
        );
    }

    #[test]
    fn zoom_and_pan_move_the_window() {
        let mut session = CropSession::new(700, 900, &config(500.0, 600.0));
        reset(&mut session);
        session.set_zoom(2.0);
        // image 1400x1800 centred; box sees the middle 175x225 source pixels
        let r = session.crop_region();
        assert_eq!((r.x, r.y, r.width, r.height), (263, 338, 175, 225));

        // dragging the image right by 100 viewport px reveals 50 source px further left
        session.begin_drag(Offset::new(10.0, 10.0));
        session.drag_to(Offset::new(60.0, 10.0));
        session.drag_to(Offset::new(110.0, 10.0));
        session.end_drag();
        assert_eq!(session.state().pan_offset, Offset::new(100.0, 0.0));
        let r = session.crop_region();
        assert_eq!((r.x, r.width), (213, 175));
    }

    #[test]
    fn drag_without_begin_is_ignored() {
        let mut session = CropSession::new(350, 450, &config(500.0, 600.0));
        let before = *session.state();
        session.drag_to(Offset::new(50.0, 50.0));
        assert_eq!(*session.state(), before);
        assert!(!session.is_dragging());
    }

    #[test]
    fn out_of_bounds_pan_clamps_instead_of_failing() {
        let mut session = CropSession::new(350, 450, &config(500.0, 600.0));
        reset(&mut session);
        session.set_pan(Offset::new(200.0, 0.0));
        let r = session.crop_region();
        assert_eq!((r.x, r.width), (0, 150));

        session.set_pan(Offset::new(10_000.0, -10_000.0));
        let r = session.crop_region();
        assert!(r.width >= 1 && r.height >= 1);
        assert!(r.x + r.width <= 350);
        assert!(r.y + r.height <= 450);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut session = CropSession::new(350, 450, &config(500.0, 600.0));
        session.set_zoom(10.0);
        assert_eq!(session.state().zoom, 4.0);
        session.set_zoom(0.01);
        assert_eq!(session.state().zoom, 0.1);
        session.set_zoom(f64::NAN);
        assert_eq!(session.state().zoom, 0.1);
    }

    #[test]
    fn rotation_entry_and_steps() {
        let mut session = CropSession::new(350, 450, &config(500.0, 600.0));
        session.set_rotation_text(" 12.5 ");
        assert_eq!(session.state().rotation_deg, 12.5);
        session.set_rotation_text("abc");
        assert_eq!(session.state().rotation_deg, 0.0);
        session.rotate_by(-90.0);
        session.rotate_by(-180.0);
        assert_eq!(session.state().rotation_deg, -270.0);
        assert_eq!(session.display_rotation(), 90.0);
        session.rotate_by(-90.0);
        session.rotate_by(-360.0);
        assert_eq!(session.display_rotation(), 0.0);
    }

    #[test]
    fn quarter_turn_maps_into_rotated_frame() {
        let mut session = CropSession::new(450, 350, &config(500.0, 600.0));
        reset(&mut session);
        session.rotate_by(90.0);
        let r = session.commit();
        assert_eq!((r.x, r.y, r.width, r.height), (0, 0, 350, 450));
        assert_eq!(r.rotation_deg, 90.0);
    }

    #[test]
    fn rotated_bounds_grow_for_oblique_angles() {
        assert_eq!(rotated_bounds(100, 50, 0.0), (100, 50));
        assert_eq!(rotated_bounds(100, 50, 270.0), (50, 100));
        assert_eq!(rotated_bounds(100, 100, 45.0), (141, 141));
    }

    #[test]
    fn auto_frame_overfills_and_lifts() {
        let cfg = config(500.0, 600.0);
        let session = CropSession::new(1000, 1500, &cfg);
        let state = session.state();
        let expected = (350.0 * cfg.width_overfill / 1000.0).max(450.0 * cfg.height_overfill / 1500.0);
        assert!((state.zoom - expected).abs() < 1e-12);
        assert!((state.pan_offset.y + 0.18 * 1500.0 * state.zoom).abs() < 1e-9);
        assert_eq!(state.pan_offset.x, 0.0);
        assert_eq!(state.rotation_deg, 0.0);

        let tiny = CropSession::new(20, 20, &cfg);
        assert_eq!(tiny.state().zoom, 4.0);
    }
}
