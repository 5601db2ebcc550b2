//! Minimal MRC-family volume/image reader and writer: a fixed-size
//! metadata header followed by real-valued pixel data in native
//! (little-endian) byte order, matching the header-then-raw-pixels shape
//! used elsewhere in this crate's I/O rather than a memory-mapped
//! implementation, since volumes here are written once per iteration and
//! read once at startup, not streamed frame-by-frame. Side length is
//! exposed as `nx`/`ny`/`nz`.
//!
//! Only the handful of header fields this crate actually needs are
//! modeled (extent, mode, origin); on-disk format variations beyond that
//! (extended headers, symmetry-record blocks) are not supported.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{EmError, Result};
use crate::image::{RealImage, RealVolume};

const HEADER_LEN: usize = 1024;
/// MRC mode 2: 32-bit float, real-valued.
const MODE_FLOAT32: i32 = 2;

#[derive(Clone, Copy, Debug)]
pub struct MrcHeader {
    pub nx: i32,
    pub ny: i32,
    pub nz: i32,
    pub mode: i32,
}

fn read_header<R: Read>(r: &mut R) -> Result<MrcHeader> {
    let nx = r.read_i32::<LittleEndian>()?;
    let ny = r.read_i32::<LittleEndian>()?;
    let nz = r.read_i32::<LittleEndian>()?;
    let mode = r.read_i32::<LittleEndian>()?;
    let mut rest = [0u8; HEADER_LEN - 16];
    r.read_exact(&mut rest)?;
    if mode != MODE_FLOAT32 {
        return Err(EmError::InvalidVolume(format!(
            "unsupported MRC mode {mode} (only float32 mode 2 is supported)"
        )));
    }
    Ok(MrcHeader { nx, ny, nz, mode })
}

fn write_header<W: Write>(w: &mut W, nx: i32, ny: i32, nz: i32) -> Result<()> {
    w.write_i32::<LittleEndian>(nx)?;
    w.write_i32::<LittleEndian>(ny)?;
    w.write_i32::<LittleEndian>(nz)?;
    w.write_i32::<LittleEndian>(MODE_FLOAT32)?;
    w.write_all(&[0u8; HEADER_LEN - 16])?;
    Ok(())
}

/// Read just the header of an MRC-family file, without loading pixel data.
pub fn peek_header(path: &Path) -> Result<MrcHeader> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_header(&mut reader)
}

/// Read a cubic real-space volume from an MRC file. Errors if the file
/// is not cubic or its side doesn't match `expected_n` (when given).
pub fn read_volume(path: &Path, expected_n: Option<usize>) -> Result<RealVolume> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)?;

    let (nx, ny, nz) = (header.nx as usize, header.ny as usize, header.nz as usize);
    if nx != ny || ny != nz {
        return Err(EmError::InvalidVolume(format!(
            "volume must be cubic, got {nx}x{ny}x{nz}"
        )));
    }
    if let Some(expected) = expected_n {
        if nx != expected {
            return Err(EmError::Dimension { expected, got: nx });
        }
    }

    let mut vol = RealVolume::zeros(nx);
    for k in 0..nx {
        for j in 0..nx {
            for i in 0..nx {
                vol.data[[k, j, i]] = reader.read_f32::<LittleEndian>()? as f64;
            }
        }
    }
    Ok(vol)
}

/// Write a cubic real-space volume to an MRC file (mode 2, float32).
pub fn write_volume(path: &Path, vol: &RealVolume) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let n = vol.n as i32;
    write_header(&mut writer, n, n, n)?;
    for &v in vol.data.iter() {
        writer.write_f32::<LittleEndian>(v as f32)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a single 2D real-space image (`nz == 1`) from an MRC-family file,
/// optionally selecting a 1-based slice `k` out of a multi-image stack
/// (`db::ParticleLocation::slice`, already 0-based).
pub fn read_image(path: &Path, slice: Option<usize>, expected_n: Option<usize>) -> Result<RealImage> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)?;

    let (nx, ny, nz) = (header.nx as usize, header.ny as usize, header.nz.max(1) as usize);
    if nx != ny {
        return Err(EmError::InvalidVolume(format!("image must be square, got {nx}x{ny}")));
    }
    if let Some(expected) = expected_n {
        if nx != expected {
            return Err(EmError::Dimension { expected, got: nx });
        }
    }
    let slice = slice.unwrap_or(0);
    if slice >= nz {
        return Err(EmError::InvalidVolume(format!(
            "slice {slice} out of range for stack of {nz} images"
        )));
    }

    let plane_floats = nx * nx;
    if slice > 0 {
        let skip_bytes = (slice * plane_floats * 4) as i64;
        std::io::Seek::seek(&mut reader, std::io::SeekFrom::Current(skip_bytes))
            .map_err(EmError::Io)?;
    }

    let mut img = RealImage::zeros(nx);
    for j in 0..nx {
        for i in 0..nx {
            img.data[[j, i]] = reader.read_f32::<LittleEndian>()? as f64;
        }
    }
    Ok(img)
}

/// Write a single 2D real-space image to an MRC-family file (`nz == 1`).
pub fn write_image(path: &Path, img: &RealImage) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let n = img.n as i32;
    write_header(&mut writer, n, n, 1)?;
    for &v in img.data.iter() {
        writer.write_f32::<LittleEndian>(v as f32)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn volume_round_trips_through_mrc() {
        let n = 8;
        let mut vol = RealVolume::zeros(n);
        for (idx, v) in vol.data.iter_mut().enumerate() {
            *v = (idx % 13) as f64 - 6.0;
        }
        let tmp = NamedTempFile::new().unwrap();
        write_volume(tmp.path(), &vol).unwrap();
        let back = read_volume(tmp.path(), Some(n)).unwrap();
        for (a, b) in vol.data.iter().zip(back.data.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn volume_dimension_mismatch_is_an_error() {
        let vol = RealVolume::zeros(8);
        let tmp = NamedTempFile::new().unwrap();
        write_volume(tmp.path(), &vol).unwrap();
        assert!(read_volume(tmp.path(), Some(16)).is_err());
    }

    #[test]
    fn image_round_trips_through_mrc() {
        let n = 8;
        let mut img = RealImage::zeros(n);
        for (idx, v) in img.data.iter_mut().enumerate() {
            *v = (idx % 7) as f64 - 3.0;
        }
        let tmp = NamedTempFile::new().unwrap();
        write_image(tmp.path(), &img).unwrap();
        let back = read_image(tmp.path(), None, Some(n)).unwrap();
        for (a, b) in img.data.iter().zip(back.data.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
