//! Element types and the byte layout of a data unit.
//!
//! FITS declares image axes fastest first (`NAXIS1` varies quickest); the
//! logical addressing exposed by this crate is slow-to-fast, so a user
//! indexing `[i, j, k, l]` walks `NAXISn, NAXISn-1, ..., NAXIS1`.

use serde::Serialize;

use crate::error::Error;

/// Element type of a data unit, as declared by the `BITPIX` card.
///
/// FITS data is big-endian on disk whatever the element type.
#[derive(Debug, PartialEq, Eq, Serialize, Clone, Copy)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    pub fn from_code(code: i64) -> Result<Self, Error> {
        match code {
            8 => Ok(Bitpix::U8),
            16 => Ok(Bitpix::I16),
            32 => Ok(Bitpix::I32),
            64 => Ok(Bitpix::I64),
            -32 => Ok(Bitpix::F32),
            -64 => Ok(Bitpix::F64),
            _ => Err(Error::UnsupportedFits(format!("BITPIX = {code}"))),
        }
    }

    /// The value of the `BITPIX` card.
    pub fn code(&self) -> i64 {
        match self {
            Bitpix::U8 => 8,
            Bitpix::I16 => 16,
            Bitpix::I32 => 32,
            Bitpix::I64 => 64,
            Bitpix::F32 => -32,
            Bitpix::F64 => -64,
        }
    }

    /// Size in bytes of one element.
    pub fn byte_size(&self) -> u64 {
        (self.code().unsigned_abs() / 8) as u64
    }
}

/// Shape and byte strides of a data unit, slow-to-fast.
///
/// For an image the shape is `(NAXISn, ..., NAXIS1)`; for a binary table
/// it is `(NAXIS2, NAXIS1)`, i.e. rows then bytes per row, with element
/// type `U8` so the same stride arithmetic covers both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataLayout {
    pub bitpix: Bitpix,
    pub shape: Vec<u64>,
    pub strides: Vec<u64>,
}

impl DataLayout {
    pub fn new(bitpix: Bitpix, shape: Vec<u64>) -> Self {
        let strides = suffix_strides(bitpix.byte_size(), &shape);
        Self {
            bitpix,
            shape,
            strides,
        }
    }

    /// Layout of an image HDU. `naxisn` comes in FITS order
    /// (`NAXIS1..NAXISn`, fastest first) and is reversed here.
    pub fn image(bitpix: Bitpix, naxisn: &[u64]) -> Self {
        let shape = naxisn.iter().rev().copied().collect();
        Self::new(bitpix, shape)
    }

    /// Layout of a binary table HDU: `(rows, bytes per row)`.
    pub fn bintable(naxis1: u64, naxis2: u64) -> Self {
        Self::new(Bitpix::U8, vec![naxis2, naxis1])
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Exact payload size in bytes, before block padding.
    pub fn data_size(&self) -> u64 {
        if self.shape.is_empty() {
            return 0;
        }
        self.bitpix.byte_size() * self.shape.iter().product::<u64>()
    }
}

/// Byte stride per axis: the last axis strides one element, every slower
/// axis strides the full extent of the next faster one.
fn suffix_strides(element_bytes: u64, shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![0u64; shape.len()];
    let mut stride = element_bytes;
    for (i, len) in shape.iter().enumerate().rev() {
        strides[i] = stride;
        stride *= len;
    }
    strides
}
