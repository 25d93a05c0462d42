//! Lossless little-endian dump of a `MaskedImage<f32>`.
//!
//! Layout: 8-byte magic, `u32` width, `u32` height, `i64` x0, `i64` y0,
//! then the image plane (`f32`), the mask plane (`u16`) and the variance
//! plane (`f32`), each row-major.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;

use crate::consts::{MAX_RAW_PIXELS, RAW_MAGIC};
use crate::error::{DiffimError, Result};
use crate::masked_image::MaskedImage;

pub fn save_raw(image: &MaskedImage<f32>, path: &Path) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_raw(&mut w, image)?;
    w.flush()?;
    Ok(())
}

pub fn load_raw(path: &Path) -> Result<MaskedImage<f32>> {
    let mut r = BufReader::new(File::open(path)?);
    read_raw(&mut r)
}

pub fn write_raw(w: &mut impl Write, image: &MaskedImage<f32>) -> Result<()> {
    let width = u32::try_from(image.width())
        .map_err(|_| DiffimError::InvalidRaw("image too wide".into()))?;
    let height = u32::try_from(image.height())
        .map_err(|_| DiffimError::InvalidRaw("image too tall".into()))?;

    w.write_all(RAW_MAGIC)?;
    w.write_u32::<LittleEndian>(width)?;
    w.write_u32::<LittleEndian>(height)?;
    w.write_i64::<LittleEndian>(image.x0)?;
    w.write_i64::<LittleEndian>(image.y0)?;
    for &v in image.image.iter() {
        w.write_f32::<LittleEndian>(v)?;
    }
    for &m in image.mask.iter() {
        w.write_u16::<LittleEndian>(m)?;
    }
    for &v in image.variance.iter() {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

pub fn read_raw(r: &mut impl Read) -> Result<MaskedImage<f32>> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != RAW_MAGIC {
        return Err(DiffimError::InvalidRaw("bad magic".into()));
    }
    let width = r.read_u32::<LittleEndian>()? as usize;
    let height = r.read_u32::<LittleEndian>()? as usize;
    let x0 = r.read_i64::<LittleEndian>()?;
    let y0 = r.read_i64::<LittleEndian>()?;
    if width == 0 || height == 0 {
        return Err(DiffimError::InvalidRaw(format!(
            "empty image ({width}x{height})"
        )));
    }

    let n = width
        .checked_mul(height)
        .filter(|&n| n <= MAX_RAW_PIXELS)
        .ok_or_else(|| DiffimError::InvalidRaw(format!("image too large ({width}x{height})")))?;
    let mut image = vec![0.0f32; n];
    r.read_f32_into::<LittleEndian>(&mut image)?;
    let mut mask = vec![0u16; n];
    r.read_u16_into::<LittleEndian>(&mut mask)?;
    let mut variance = vec![0.0f32; n];
    r.read_f32_into::<LittleEndian>(&mut variance)?;

    let shape = (height, width);
    let plane = |e: ndarray::ShapeError| DiffimError::InvalidRaw(e.to_string());
    let mi = MaskedImage::new(
        Array2::from_shape_vec(shape, image).map_err(plane)?,
        Array2::from_shape_vec(shape, mask).map_err(plane)?,
        Array2::from_shape_vec(shape, variance).map_err(plane)?,
    )?;
    Ok(mi.with_origin(x0, y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::SAT;

    #[test]
    fn test_rejects_bad_magic() {
        let bytes = b"NOTARAW!\0\0\0\0".to_vec();
        let err = read_raw(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, DiffimError::InvalidRaw(_)));
    }

    fn header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = RAW_MAGIC.to_vec();
        bytes.write_u32::<LittleEndian>(width).unwrap();
        bytes.write_u32::<LittleEndian>(height).unwrap();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes.write_i64::<LittleEndian>(0).unwrap();
        bytes
    }

    #[test]
    fn test_rejects_oversized_header_before_reading_planes() {
        for (w, h) in [(u32::MAX, u32::MAX), (1 << 15, 1 << 14)] {
            let bytes = header(w, h);
            let err = read_raw(&mut bytes.as_slice()).unwrap_err();
            assert!(matches!(err, DiffimError::InvalidRaw(_)), "{w}x{h}: {err:?}");
        }
    }

    #[test]
    fn test_rejects_empty_header() {
        let bytes = header(0, 5);
        let err = read_raw(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, DiffimError::InvalidRaw(_)));
    }

    #[test]
    fn test_in_memory_roundtrip_keeps_planes() {
        let mut mi = MaskedImage::from_image(
            Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32 - 5.5),
            0.25,
        )
        .with_origin(-2, 7);
        mi.mask[[1, 2]] = SAT;

        let mut buf = Vec::new();
        write_raw(&mut buf, &mi).unwrap();
        let back = read_raw(&mut buf.as_slice()).unwrap();
        assert_eq!(back.image, mi.image);
        assert_eq!(back.mask, mi.mask);
        assert_eq!(back.variance, mi.variance);
        assert_eq!((back.x0, back.y0), (-2, 7));
    }
}
