use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::info;

use crate::config::SheetConfig;
use crate::error::{Result, StudioError};
use crate::image_io::write_png_to_path;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const GUIDE: Rgba<u8> = Rgba([200, 200, 200, 255]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub sheet_width: u32,
    pub sheet_height: u32,
    pub photo_width: u32,
    pub photo_height: u32,
    pub columns: u32,
    pub rows: u32,
    pub gutter_x: u32,
    pub gutter_y: u32,
    /// Top-left corner of every copy, row-major.
    pub positions: Vec<(u32, u32)>,
}

struct Candidate {
    sheet: (u32, u32),
    columns: u32,
    rows: u32,
    gutter_x: u32,
    gutter_y: u32,
}

/// Start offsets of `count` cells of `cell` px with equal gaps, centred in
/// `span` px.
fn spread(span: u32, cell: u32, count: u32) -> (u32, Vec<u32>) {
    let used = cell * count;
    let gap = (span - used) / (count + 1);
    let leftover = span - used - gap * (count + 1);
    let start = gap + leftover / 2;
    let offsets = (0..count).map(|i| start + i * (cell + gap)).collect();
    (gap, offsets)
}

impl SheetLayout {
    /// Picks the grid (portrait sheet first, then landscape) that holds every
    /// copy at full size with the widest minimum gutter.
    pub fn compute(config: &SheetConfig) -> Result<Self> {
        let (photo_w, photo_h) = config.photo_px();
        let (sheet_w, sheet_h) = config.sheet_px();
        let copies = config.copies;
        if copies == 0 || photo_w == 0 || photo_h == 0 {
            return Err(StudioError::Layout(format!(
                "{copies} copies of {photo_w}x{photo_h}px"
            )));
        }

        let mut best: Option<Candidate> = None;
        for sheet in [(sheet_w, sheet_h), (sheet_h, sheet_w)] {
            let max_columns = sheet.0 / photo_w;
            for columns in 1..=copies.min(max_columns) {
                let rows = copies.div_ceil(columns);
                let fits = rows
                    .checked_mul(photo_h)
                    .map(|height| height <= sheet.1)
                    .unwrap_or(false);
                if !fits {
                    continue;
                }
                let gutter_x = (sheet.0 - columns * photo_w) / (columns + 1);
                let gutter_y = (sheet.1 - rows * photo_h) / (rows + 1);
                let score = gutter_x.min(gutter_y);
                let better = best
                    .as_ref()
                    .map(|b| score > b.gutter_x.min(b.gutter_y))
                    .unwrap_or(true);
                if better {
                    best = Some(Candidate {
                        sheet,
                        columns,
                        rows,
                        gutter_x,
                        gutter_y,
                    });
                }
            }
        }

        let chosen = best.ok_or_else(|| {
            StudioError::Layout(format!(
                "{copies} copies of {photo_w}x{photo_h}px do not fit on {sheet_w}x{sheet_h}px"
            ))
        })?;

        let (gutter_x, xs) = spread(chosen.sheet.0, photo_w, chosen.columns);
        let (gutter_y, ys) = spread(chosen.sheet.1, photo_h, chosen.rows);
        let positions = (0..copies)
            .map(|i| {
                (
                    xs[(i % chosen.columns) as usize],
                    ys[(i / chosen.columns) as usize],
                )
            })
            .collect();

        Ok(Self {
            sheet_width: chosen.sheet.0,
            sheet_height: chosen.sheet.1,
            photo_width: photo_w,
            photo_height: photo_h,
            columns: chosen.columns,
            rows: chosen.rows,
            gutter_x,
            gutter_y,
            positions,
        })
    }
}

/// Alpha-composites over white paper.
fn flatten_on_paper(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        let a = px[3] as u32;
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((px[c] as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        }
        px[3] = 255;
    }
}

fn draw_outline(sheet: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64) {
    let (sw, sh) = (sheet.width() as i64, sheet.height() as i64);
    let mut put = |px: i64, py: i64| {
        if px >= 0 && py >= 0 && px < sw && py < sh {
            sheet.put_pixel(px as u32, py as u32, GUIDE);
        }
    };
    for i in x..x + w {
        put(i, y);
        put(i, y + h - 1);
    }
    for j in y..y + h {
        put(x, j);
        put(x + w - 1, j);
    }
}

/// Scales `photo` into a `width`x`height` cell without changing its aspect.
/// Uncovered margins stay transparent and print as paper.
fn fit_to_tile(photo: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if photo.dimensions() == (width, height) {
        return photo.clone();
    }
    let scale = (width as f64 / photo.width() as f64).min(height as f64 / photo.height() as f64);
    let fit_w = ((photo.width() as f64 * scale).round() as u32).clamp(1, width);
    let fit_h = ((photo.height() as f64 * scale).round() as u32).clamp(1, height);
    let scaled = if (fit_w, fit_h) == photo.dimensions() {
        photo.clone()
    } else {
        imageops::resize(photo, fit_w, fit_h, FilterType::Lanczos3)
    };
    let mut tile = RgbaImage::new(width, height);
    imageops::replace(
        &mut tile,
        &scaled,
        ((width - fit_w) / 2) as i64,
        ((height - fit_h) / 2) as i64,
    );
    tile
}

/// Lays out `config.copies` copies of `photo`, each resampled to the exact
/// physical photo size.
pub fn compose_sheet(photo: &RgbaImage, config: &SheetConfig) -> Result<RgbaImage> {
    if photo.width() == 0 || photo.height() == 0 {
        return Err(StudioError::EmptyImage);
    }
    let layout = SheetLayout::compute(config)?;
    let mut tile = fit_to_tile(photo, layout.photo_width, layout.photo_height);
    flatten_on_paper(&mut tile);

    let mut sheet = RgbaImage::from_pixel(layout.sheet_width, layout.sheet_height, PAPER);
    for &(x, y) in &layout.positions {
        if config.cut_guides && layout.gutter_x > 0 && layout.gutter_y > 0 {
            draw_outline(
                &mut sheet,
                x as i64 - 1,
                y as i64 - 1,
                layout.photo_width as i64 + 2,
                layout.photo_height as i64 + 2,
            );
        }
        imageops::replace(&mut sheet, &tile, x as i64, y as i64);
    }
    info!(
        width = layout.sheet_width,
        height = layout.sheet_height,
        columns = layout.columns,
        rows = layout.rows,
        copies = layout.positions.len(),
        "print sheet composed"
    );
    Ok(sheet)
}

pub fn sheet_file_name(epoch_ms: u128) -> String {
    format!("passport-photo-sheet-{epoch_ms}.png")
}

/// Writes the sheet as `passport-photo-sheet-<unix-epoch-ms>.png` in `dir`.
pub fn export_sheet(sheet: &RgbaImage, dir: &Path) -> Result<PathBuf> {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let path = dir.join(sheet_file_name(epoch_ms));
    let bytes = write_png_to_path(sheet, &path)?;
    info!(path = %path.display(), bytes = bytes.len(), "sheet exported");
    Ok(path)
}
