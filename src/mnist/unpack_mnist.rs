use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use crate::error::{PipelineError, Result};
use crate::mnist::header::{ImageHeader, LabelHeader, IMAGE_HEADER_LEN, LABEL_HEADER_LEN};
use crate::mnist::label_map::{raster_file_name, LabelMap};
use crate::mnist::raster::write_raster;

// Digits 0 through 9
const MAX_LABEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    pub count: usize,
    pub rows: u32,
    pub cols: u32,
}

// Decode an IDX image/label file pair into one PNG per example plus a label map.
// The expected format is:
// - Image file: 16 byte header [magic][count][rows][cols], then count * rows * cols pixel bytes
// - Label file: 8 byte header [magic][count], then count label bytes
// - All header fields are big-endian u32
// Any failure aborts the whole decode. The label map is only written once every raster
// succeeded, so a directory without one must not be trusted.
pub fn unpack_mnist(
    image_file: &Path,
    label_file: &Path,
    output_dir: &Path,
    label_map_name: &str,
    progress_interval: usize,
) -> Result<UnpackSummary> {
    let mut images = open(image_file)?;
    let mut labels = open(label_file)?;

    // Both headers are checked before any example is touched
    let mut image_header = [0_u8; IMAGE_HEADER_LEN];
    read_header(&mut images, image_file, &mut image_header)?;
    let image_header = ImageHeader::parse(&image_header).map_err(|reason| {
        PipelineError::InvalidHeader {
            path: image_file.to_path_buf(),
            reason,
        }
    })?;

    let mut label_header = [0_u8; LABEL_HEADER_LEN];
    read_header(&mut labels, label_file, &mut label_header)?;
    let label_header = LabelHeader::parse(&label_header).map_err(|reason| {
        PipelineError::InvalidHeader {
            path: label_file.to_path_buf(),
            reason,
        }
    })?;

    if image_header.count != label_header.count {
        return Err(PipelineError::DatasetMismatch {
            images: image_header.count,
            labels: label_header.count,
        });
    }

    // A raster buffer is only allocated once the file is known to hold at least one.
    // Shorter data past that point fails with the index of the first missing example.
    let image_len = file_len(&images, image_file)?;
    let first_raster = (IMAGE_HEADER_LEN + image_header.raster_len()) as u64;
    if image_header.count > 0 && image_len < first_raster {
        return Err(PipelineError::InvalidHeader {
            path: image_file.to_path_buf(),
            reason: format!(
                "header declares {} bytes of rasters but the file holds {}",
                image_header.data_len(),
                image_len.saturating_sub(IMAGE_HEADER_LEN as u64)
            ),
        });
    }

    let count = image_header.count as usize;
    tracing::info!(
        "Processing {} images ({}x{})...",
        count,
        image_header.rows,
        image_header.cols
    );

    fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;
    // A map left by an earlier decode would describe rasters this run may not finish
    let label_map_path = output_dir.join(label_map_name);
    match fs::remove_file(&label_map_path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(PipelineError::io(label_map_path, e));
        }
        _ => {}
    }

    let now = Instant::now();
    let mut label_map = LabelMap::new();
    // Reused for every example
    let mut pixels = vec![0_u8; image_header.raster_len()];
    let mut label = [0_u8; 1];
    for index in 0..count {
        images
            .read_exact(&mut pixels)
            .map_err(|e| PipelineError::io_at(image_file, index, e))?;
        labels
            .read_exact(&mut label)
            .map_err(|e| PipelineError::io_at(label_file, index, e))?;
        if label[0] > MAX_LABEL {
            return Err(PipelineError::InvalidLabel {
                path: label_file.to_path_buf(),
                index,
                label: label[0],
            });
        }

        let file_name = raster_file_name(index);
        write_raster(
            &output_dir.join(&file_name),
            &pixels,
            image_header.cols,
            image_header.rows,
        )?;
        label_map.insert(file_name, label[0]);

        if progress_interval > 0 && index % progress_interval == 0 {
            tracing::info!("Processed {}/{} images...", index, count);
        }
    }

    label_map.save(&label_map_path)?;
    tracing::info!(
        "Unpacked {} examples into {} [{}ms]",
        count,
        output_dir.display(),
        now.elapsed().as_millis()
    );

    Ok(UnpackSummary {
        count,
        rows: image_header.rows,
        cols: image_header.cols,
    })
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| PipelineError::io(path, e))
}

fn file_len(reader: &BufReader<File>, path: &Path) -> Result<u64> {
    reader
        .get_ref()
        .metadata()
        .map(|metadata| metadata.len())
        .map_err(|e| PipelineError::io(path, e))
}

fn read_header(reader: &mut impl Read, path: &Path, header: &mut [u8]) -> Result<()> {
    reader.read_exact(header).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PipelineError::InvalidHeader {
                path: path.to_path_buf(),
                reason: format!("file is shorter than its {} byte header", header.len()),
            }
        } else {
            PipelineError::io(path, e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnist::header::{IMAGE_MAGIC, LABEL_MAGIC};

    fn write_dataset(dir: &Path, image_count: u32, label_count: u32, pixel_bytes: usize) {
        write_images(dir, [image_count, 2, 2], pixel_bytes);

        let mut labels = Vec::new();
        for field in [LABEL_MAGIC, label_count] {
            labels.extend_from_slice(&field.to_be_bytes());
        }
        labels.extend((0..label_count).map(|i| (i % 10) as u8));
        fs::write(dir.join("labels"), labels).unwrap();
    }

    // Image file with header fields [count, rows, cols] and `pixel_bytes` bytes of data
    fn write_images(dir: &Path, fields: [u32; 3], pixel_bytes: usize) {
        let mut images = Vec::new();
        for field in [IMAGE_MAGIC, fields[0], fields[1], fields[2]] {
            images.extend_from_slice(&field.to_be_bytes());
        }
        images.extend((0..pixel_bytes).map(|i| (i * 10) as u8));
        fs::write(dir.join("images"), images).unwrap();
    }

    fn unpack(dir: &Path) -> Result<UnpackSummary> {
        unpack_mnist(
            &dir.join("images"),
            &dir.join("labels"),
            &dir.join("output"),
            "labels.json",
            1000,
        )
    }

    #[test]
    fn test_unpack_small_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 3, 3, 12);
        let summary = unpack(dir.path()).unwrap();
        assert_eq!(
            summary,
            UnpackSummary {
                count: 3,
                rows: 2,
                cols: 2
            }
        );

        let map = LabelMap::load(&dir.path().join("output/labels.json")).unwrap();
        assert_eq!(map.get("img_00002.png"), Some(2));
        assert!(dir.path().join("output/img_00002.png").exists());
    }

    #[test]
    fn test_short_pixel_data_reports_index() {
        let dir = tempfile::tempdir().unwrap();
        // Enough pixels for one and a half examples
        write_dataset(dir.path(), 3, 3, 6);
        match unpack(dir.path()) {
            Err(PipelineError::Io { index, .. }) => assert_eq!(index, Some(1)),
            other => panic!("expected I/O error, got {:?}", other),
        }
        // Aborted decodes leave no label map behind
        assert!(!dir.path().join("output/labels.json").exists());
    }

    #[test]
    fn test_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 1, 1, 4);
        fs::write(dir.path().join("images"), [0, 0, 8, 3, 0]).unwrap();
        assert!(matches!(
            unpack(dir.path()),
            Err(PipelineError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(unpack(dir.path()), Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_overflowing_dimensions_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 1, 1, 4);
        write_images(dir.path(), [1, u32::MAX, u32::MAX], 4);
        assert!(matches!(
            unpack(dir.path()),
            Err(PipelineError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_raster_larger_than_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 1, 1, 4);
        // Claims a 60000x60000 raster but only four bytes follow the header
        write_images(dir.path(), [1, 60000, 60000], 4);
        match unpack(dir.path()) {
            Err(PipelineError::InvalidHeader { reason, .. }) => {
                assert!(reason.contains("holds 4"), "{}", reason)
            }
            other => panic!("expected invalid header, got {:?}", other),
        }
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn test_label_above_nine_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 3, 3, 12);
        let mut labels = fs::read(dir.path().join("labels")).unwrap();
        labels[LABEL_HEADER_LEN + 1] = 12;
        fs::write(dir.path().join("labels"), labels).unwrap();

        match unpack(dir.path()) {
            Err(PipelineError::InvalidLabel { index, label, .. }) => {
                assert_eq!((index, label), (1, 12));
            }
            other => panic!("expected invalid label, got {:?}", other),
        }
        assert!(!dir.path().join("output/labels.json").exists());
    }

    #[test]
    fn test_failed_redecode_removes_previous_label_map() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), 3, 3, 12);
        unpack(dir.path()).unwrap();
        assert!(dir.path().join("output/labels.json").exists());

        write_dataset(dir.path(), 3, 3, 6);
        assert!(unpack(dir.path()).is_err());
        assert!(!dir.path().join("output/labels.json").exists());
    }
}
