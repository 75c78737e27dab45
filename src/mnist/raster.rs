use std::path::Path;

use image::GrayImage;

use crate::error::{PipelineError, Result};

// A decoded grayscale image, pixels stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Raster {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// Write raw row-major bytes as an 8-bit grayscale PNG
pub fn write_raster(path: &Path, pixels: &[u8], width: u32, height: u32) -> Result<()> {
    let image = GrayImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
        PipelineError::Encoding {
            path: path.to_path_buf(),
            reason: format!("{} bytes do not fill a {}x{} raster", pixels.len(), width, height),
        }
    })?;
    image.save(path).map_err(|e| PipelineError::Encoding {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// Read any supported image back as 8-bit grayscale
pub fn read_raster(path: &Path) -> Result<Raster> {
    let image = image::open(path)
        .map_err(|source| PipelineError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .into_luma8();
    Ok(Raster {
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_survives_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_00000.png");
        let pixels: Vec<u8> = (0..12).map(|i| i * 20).collect();
        write_raster(&path, &pixels, 4, 3).unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.pixels, pixels);
    }

    #[test]
    fn test_short_pixel_buffer_is_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let err = write_raster(&path, &[0; 5], 4, 4).unwrap_err();
        assert!(matches!(err, PipelineError::Encoding { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_raster(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }
}
