use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag};
use image::imageops;
use image::RgbaImage;

use crate::error::{Result, StudioError};

/// EXIF orientation (1..=8), if the file carries one.
pub fn read_orientation(path: &Path) -> Result<Option<u32>> {
    let file = File::open(path).map_err(|e| StudioError::io(path, e))?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader)?;
    Ok(exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|v| (1..=8).contains(v)))
}

/// Turns a raster stored with EXIF orientation `orientation` upright.
pub fn apply_orientation(img: RgbaImage, orientation: u32) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn marked() -> RgbaImage {
        // 3x2, single red marker at the top-left
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img
    }

    fn marker(img: &RgbaImage) -> (u32, u32) {
        img.enumerate_pixels()
            .find(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .unwrap()
    }

    #[test]
    fn orientations_move_the_marker() {
        assert_eq!(marker(&apply_orientation(marked(), 1)), (0, 0));
        assert_eq!(marker(&apply_orientation(marked(), 2)), (2, 0));
        assert_eq!(marker(&apply_orientation(marked(), 3)), (2, 1));
        assert_eq!(marker(&apply_orientation(marked(), 4)), (0, 1));

        let six = apply_orientation(marked(), 6);
        assert_eq!(six.dimensions(), (2, 3));
        assert_eq!(marker(&six), (1, 0));
        let eight = apply_orientation(marked(), 8);
        assert_eq!(marker(&eight), (0, 2));
        assert_eq!(marker(&apply_orientation(marked(), 5)), (0, 0));
        assert_eq!(marker(&apply_orientation(marked(), 7)), (1, 2));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_orientation(Path::new("/definitely/not/here.jpg")).unwrap_err();
        assert!(matches!(err, StudioError::Io { .. }));
    }
}
