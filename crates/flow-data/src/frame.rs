//! Frame and flow-field codecs.
//!
//! Images are decoded by the `image` crate. Flow fields come in three on-disk
//! formats:
//!
//! - Middlebury `.flo` (dense): magic `202021.25`, width, height, then
//!   `2·W·H` little-endian `f32` values.
//! - PFM `.pfm` (dense): text header `PF`/`Pf`, `W H`, scale (negative means
//!   little endian), then bottom-to-top rows of `f32`.
//! - KITTI 16-bit PNG (sparse): `(channel - 2^15) / 64` for `u`/`v` in the
//!   first two channels, validity in the third.

use std::{fs, path::Path};

use image::{ImageBuffer, Rgb, RgbImage};

use crate::{
    error::{DatasetError, DatasetResult},
    sample::{FlowField, ValidMask},
};

const FLO_MAGIC: f32 = 202_021.25;
const FLO_HEADER_LEN: usize = 12;
const KITTI_OFFSET: f32 = 32_768.0;
const KITTI_SCALE: f32 = 64.0;

/// Read an 8-bit raster as RGB. Greyscale is replicated across channels and
/// any alpha channel is dropped.
pub fn read_image(path: &Path) -> DatasetResult<RgbImage> {
    let image = image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Decode the flow behind `path`.
///
/// Sparse datasets always use the KITTI decoder, which also yields validity.
/// Dense datasets dispatch on the extension: `.flo` and `.pfm` yield no
/// validity and the caller derives it from the flow magnitudes; `.png` goes
/// through the KITTI decoder, so sparse sources mixed into a dense composite
/// still decode.
pub fn read_flow(path: &Path, sparse: bool) -> DatasetResult<(FlowField, Option<ValidMask>)> {
    if sparse {
        let (flow, valid) = read_kitti_flow(path)?;
        return Ok((flow, Some(valid)));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("flo") => Ok((read_flo(path)?, None)),
        Some("pfm") => Ok((read_pfm(path)?, None)),
        Some("png") => {
            let (flow, valid) = read_kitti_flow(path)?;
            Ok((flow, Some(valid)))
        }
        _ => Err(DatasetError::UnsupportedFlowFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_bytes(path: &Path) -> DatasetResult<Vec<u8>> {
    fs::read(path).map_err(|source| DatasetError::FileReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn le_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_f32(bytes: &[u8]) -> f32 {
    f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Product of header-derived sizes, `None` on overflow.
fn payload_len(factors: &[usize]) -> Option<usize> {
    factors
        .iter()
        .try_fold(1usize, |acc, &factor| acc.checked_mul(factor))
}

/// Read a Middlebury `.flo` file.
pub fn read_flo(path: &Path) -> DatasetResult<FlowField> {
    let bytes = read_bytes(path)?;
    if bytes.len() < FLO_HEADER_LEN {
        return Err(DatasetError::TruncatedFlow {
            path: path.to_path_buf(),
            expected: FLO_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let magic = le_f32(&bytes[0..4]);
    if magic != FLO_MAGIC {
        return Err(DatasetError::InvalidFloMagic {
            path: path.to_path_buf(),
            magic,
        });
    }

    let width = le_i32(&bytes[4..8]).max(0) as usize;
    let height = le_i32(&bytes[8..12]).max(0) as usize;
    let payload = &bytes[FLO_HEADER_LEN..];
    let expected = payload_len(&[width, height, 2, 4]).unwrap_or(usize::MAX);
    if payload.len() < expected {
        return Err(DatasetError::TruncatedFlow {
            path: path.to_path_buf(),
            expected,
            actual: payload.len(),
        });
    }

    let data = payload[..expected].chunks_exact(4).map(le_f32).collect();
    Ok(FlowField::new(data, height, width))
}

/// Write a Middlebury `.flo` file.
pub fn write_flo(path: &Path, flow: &FlowField) -> DatasetResult<()> {
    let mut bytes = Vec::with_capacity(FLO_HEADER_LEN + flow.data.len() * 4);
    bytes.extend_from_slice(&FLO_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&(flow.width as i32).to_le_bytes());
    bytes.extend_from_slice(&(flow.height as i32).to_le_bytes());
    for value in &flow.data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes).map_err(|source| DatasetError::FileWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Split one `\n`-terminated header line off the front of `bytes`.
fn take_line<'a>(bytes: &'a [u8], path: &Path) -> DatasetResult<(&'a str, &'a [u8])> {
    let end = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| DatasetError::MalformedPfmHeader {
            path: path.to_path_buf(),
            reason: "unterminated header line".into(),
        })?;
    let line = std::str::from_utf8(&bytes[..end]).map_err(|_| DatasetError::MalformedPfmHeader {
        path: path.to_path_buf(),
        reason: "header is not ASCII".into(),
    })?;
    Ok((line.trim(), &bytes[end + 1..]))
}

/// Read a PFM file and keep its first two channels as flow.
pub fn read_pfm(path: &Path) -> DatasetResult<FlowField> {
    let malformed = |reason: &str| DatasetError::MalformedPfmHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let bytes = read_bytes(path)?;
    let (kind, rest) = take_line(&bytes, path)?;
    let channels = match kind {
        "PF" => 3,
        "Pf" => return Err(malformed("single-channel PFM cannot hold flow")),
        _ => return Err(malformed("not a PFM file")),
    };

    let (dims, rest) = take_line(rest, path)?;
    let mut dims = dims.split_whitespace().map(str::parse::<usize>);
    let (width, height) = match (dims.next(), dims.next()) {
        (Some(Ok(width)), Some(Ok(height))) if width > 0 && height > 0 => (width, height),
        _ => return Err(malformed("bad dimensions line")),
    };

    let (scale, payload) = take_line(rest, path)?;
    let scale: f32 = scale.parse().map_err(|_| malformed("bad scale line"))?;
    let read_value: fn(&[u8]) -> f32 = if scale < 0.0 { le_f32 } else { be_f32 };

    let too_large = || malformed("dimensions too large");
    let row_len = payload_len(&[width, channels]).ok_or_else(too_large)?;
    let expected = payload_len(&[row_len, height, 4]).ok_or_else(too_large)?;
    if payload.len() < expected {
        return Err(DatasetError::TruncatedFlow {
            path: path.to_path_buf(),
            expected,
            actual: payload.len(),
        });
    }

    let values: Vec<f32> = payload[..expected]
        .chunks_exact(4)
        .map(read_value)
        .collect();

    // Rows are stored bottom to top.
    let mut data = Vec::with_capacity(width * height * 2);
    for row in values.chunks_exact(row_len).rev() {
        for pixel in row.chunks_exact(channels) {
            data.push(pixel[0]);
            data.push(pixel[1]);
        }
    }

    Ok(FlowField::new(data, height, width))
}

/// Read a KITTI 16-bit flow PNG, returning the flow and its validity.
pub fn read_kitti_flow(path: &Path) -> DatasetResult<(FlowField, ValidMask)> {
    let encoded = image::open(path)
        .map_err(|source| DatasetError::ImageOpenFailed {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgb16();

    let (width, height) = (encoded.width() as usize, encoded.height() as usize);
    let mut flow = Vec::with_capacity(width * height * 2);
    let mut valid = Vec::with_capacity(width * height);
    for pixel in encoded.pixels() {
        let [u, v, mask] = pixel.0;
        flow.push((f32::from(u) - KITTI_OFFSET) / KITTI_SCALE);
        flow.push((f32::from(v) - KITTI_OFFSET) / KITTI_SCALE);
        valid.push(mask > 0);
    }

    Ok((
        FlowField::new(flow, height, width),
        ValidMask::new(valid, height, width),
    ))
}

/// Write a KITTI 16-bit flow PNG. Invalid pixels are stored with zero flow.
pub fn write_kitti_flow(path: &Path, flow: &FlowField, valid: &ValidMask) -> DatasetResult<()> {
    let encode = |value: f32| (value * KITTI_SCALE + KITTI_OFFSET).clamp(0.0, 65_535.0) as u16;

    let mut raw = Vec::with_capacity(flow.width * flow.height * 3);
    for (uv, &is_valid) in flow.data.chunks_exact(2).zip(&valid.data) {
        if is_valid {
            raw.extend_from_slice(&[encode(uv[0]), encode(uv[1]), 1]);
        } else {
            raw.extend_from_slice(&[encode(0.0), encode(0.0), 0]);
        }
    }

    let encoded: ImageBuffer<Rgb<u16>, Vec<u16>> =
        ImageBuffer::from_raw(flow.width as u32, flow.height as u32, raw).ok_or_else(|| {
            DatasetError::TruncatedFlow {
                path: path.to_path_buf(),
                expected: flow.width * flow.height * 3,
                actual: flow.data.len() / 2 * 3,
            }
        })?;
    encoded
        .save(path)
        .map_err(|source| DatasetError::ImageSaveFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    fn sample_flow() -> FlowField {
        FlowField::new(vec![0.5, -1.25, 3.0, 4.0, -7.5, 0.0, 12.0, -0.25], 2, 2)
    }

    #[test]
    fn flo_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.flo");
        write_flo(&path, &sample_flow()).unwrap();

        let flow = read_flo(&path).unwrap();
        assert_eq!(flow, sample_flow());
    }

    #[test]
    fn flo_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.flo");
        let mut bytes = 1.0f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 8]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_flo(&path),
            Err(DatasetError::InvalidFloMagic { .. })
        ));
    }

    #[test]
    fn flo_rejects_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.flo");
        let mut bytes = FLO_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&4i32.to_le_bytes());
        bytes.extend_from_slice(&4i32.to_le_bytes());
        bytes.extend_from_slice(&[0; 16]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_flo(&path),
            Err(DatasetError::TruncatedFlow { expected: 128, .. })
        ));
    }

    #[test]
    fn pfm_flips_rows_and_drops_third_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.pfm");
        // 1 column, 2 rows, stored bottom row first.
        let mut bytes = b"PF\n1 2\n-1.0\n".to_vec();
        for value in [10.0f32, 11.0, 99.0, 20.0, 21.0, 99.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let flow = read_pfm(&path).unwrap();
        assert_eq!(flow.shape(), [2, 1, 2]);
        assert_eq!(flow.at(0, 0), [20.0, 21.0]);
        assert_eq!(flow.at(0, 1), [10.0, 11.0]);
    }

    #[test]
    fn flo_with_huge_dimensions_is_truncated_not_overflowing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.flo");
        let mut bytes = FLO_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0; 16]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_flo(&path),
            Err(DatasetError::TruncatedFlow { actual: 16, .. })
        ));
    }

    #[test]
    fn pfm_with_huge_dimensions_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.pfm");
        let header = format!("PF\n{} {}\n-1.0\n", usize::MAX, usize::MAX);
        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(&[0; 12]);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_pfm(&path),
            Err(DatasetError::MalformedPfmHeader { .. })
        ));
    }

    #[test]
    fn pfm_positive_scale_is_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.pfm");
        let mut bytes = b"PF\n1 1\n1.0\n".to_vec();
        for value in [1.5f32, -2.0, 0.0] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        fs::write(&path, bytes).unwrap();

        assert_eq!(read_pfm(&path).unwrap().at(0, 0), [1.5, -2.0]);
    }

    #[test]
    fn kitti_png_round_trip_keeps_validity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000_10.png");
        let flow = FlowField::new(vec![1.5, -2.25, 300.0, 0.0], 1, 2);
        let valid = ValidMask::new(vec![true, false], 1, 2);
        write_kitti_flow(&path, &flow, &valid).unwrap();

        let (decoded, decoded_valid) = read_kitti_flow(&path).unwrap();
        assert_eq!(decoded_valid.data, vec![true, false]);
        assert_eq!(decoded.at(0, 0), [1.5, -2.25]);
        assert_eq!(decoded.at(1, 0), [0.0, 0.0]);
    }

    #[test]
    fn read_flow_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let flo = dir.path().join("a.flo");
        write_flo(&flo, &sample_flow()).unwrap();

        let (flow, valid) = read_flow(&flo, false).unwrap();
        assert_eq!(flow.shape(), [2, 2, 2]);
        assert!(valid.is_none());

        let png = dir.path().join("a.png");
        let flow = FlowField::new(vec![1.0, 2.0], 1, 1);
        write_kitti_flow(&png, &flow, &ValidMask::new(vec![true], 1, 1)).unwrap();
        let (decoded, valid) = read_flow(&png, false).unwrap();
        assert_eq!(decoded.at(0, 0), [1.0, 2.0]);
        assert_eq!(valid.unwrap().data, vec![true]);

        let jpg = dir.path().join("a.jpg");
        assert!(matches!(
            read_flow(&jpg, false),
            Err(DatasetError::UnsupportedFlowFormat { .. })
        ));
    }

    #[test]
    fn greyscale_images_are_replicated_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grey.png");
        GrayImage::from_pixel(3, 2, Luma([77])).save(&path).unwrap();

        let image = read_image(&path).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|p| p.0 == [77, 77, 77]));
    }
}
