//! The HDU descriptor produced by the indexer.
//!
//! A descriptor records where a header and its data unit live in the
//! file, the raw header bytes, and the derived layout (shape, strides,
//! element type). Descriptors are built once at indexing time and are
//! read-only afterwards.

pub mod header;
pub mod layout;

use serde::Serialize;

use crate::card::Value;
use crate::error::Error;
use crate::hdu::header::{
    check_for_bitpix, check_for_gcount, check_for_naxis, check_for_naxisn, check_for_pcount,
    Header,
};
use crate::hdu::layout::{Bitpix, DataLayout};

/// FITS files are made of fixed 2880 byte blocks, for headers and data
/// alike.
pub const BLOCK_SIZE: usize = 2880;

/// Round `n` up to the next block boundary.
pub fn padded_len(n: u64) -> u64 {
    n.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum HduKind {
    Primary,
    Image,
    BinTable,
}

impl HduKind {
    /// Decide the kind from the opening card. `first` tells whether the
    /// header sits at offset 0, where `SIMPLE` is mandatory.
    pub(crate) fn of_header(header: &Header, first: bool) -> Result<Self, Error> {
        let opening = header.opening_keyword();
        if opening == b"SIMPLE  " {
            if !first {
                return Err(Error::InvalidFits(
                    "SIMPLE keyword in extension position".to_owned(),
                ));
            }
            match header.get("SIMPLE") {
                Some(Value::Logical(true)) => Ok(HduKind::Primary),
                _ => Err(Error::InvalidFits("SIMPLE is not T".to_owned())),
            }
        } else if opening == b"XTENSION" {
            if first {
                return Err(Error::InvalidFits(
                    "file does not begin with a SIMPLE card".to_owned(),
                ));
            }
            let xtension = header
                .get("XTENSION")
                .cloned()
                .ok_or_else(|| Error::InvalidFits("unreadable XTENSION card".to_owned()))?
                .check_for_string()?;
            match xtension.trim_end() {
                "IMAGE" | "IUEIMAGE" => Ok(HduKind::Image),
                "BINTABLE" => Ok(HduKind::BinTable),
                other => Err(Error::UnsupportedFits(format!("XTENSION = '{other}'"))),
            }
        } else {
            Err(Error::InvalidFits("block does not open an HDU".to_owned()))
        }
    }
}

/// One Header/Data Unit, located within its file.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub kind: HduKind,
    /// Byte offset of the header, a multiple of 2880.
    pub header_offset: u64,
    /// Byte offset of the data unit, right after the header.
    pub data_offset: u64,
    /// Exact payload size in bytes (`element_bytes * prod(shape)` for an
    /// image, `NAXIS1 * NAXIS2` for a table).
    pub data_size: u64,
    /// Block-padded span of the data unit, a multiple of 2880.
    pub data_len: u64,
    pub layout: DataLayout,
    header: Header,
}

impl Hdu {
    /// Derive a descriptor from a parsed header. Mandatory keyword and
    /// scope checks happen here, once, at indexing time.
    pub(crate) fn from_header(
        header_offset: u64,
        header: Header,
        first: bool,
    ) -> Result<Self, Error> {
        let kind = HduKind::of_header(&header, first)?;

        let layout = match kind {
            HduKind::Primary | HduKind::Image => {
                let bitpix = check_for_bitpix(&header)?;
                let naxis = check_for_naxis(&header)?;
                let naxisn = (1..=naxis)
                    .map(|i| check_for_naxisn(&header, i))
                    .collect::<Result<Vec<_>, _>>()?;
                // GROUP FITS (PCOUNT > 0, GCOUNT > 1) is out of scope.
                if check_for_pcount(&header)? != 0 || check_for_gcount(&header)? != 1 {
                    return Err(Error::UnsupportedFits(
                        "random groups structure (PCOUNT/GCOUNT)".to_owned(),
                    ));
                }
                DataLayout::image(bitpix, &naxisn)
            }
            HduKind::BinTable => {
                if check_for_bitpix(&header)? != Bitpix::U8 {
                    return Err(Error::InvalidFits(
                        "binary table HDU must have BITPIX = 8".to_owned(),
                    ));
                }
                if check_for_naxis(&header)? != 2 {
                    return Err(Error::InvalidFits(
                        "binary table HDU must have NAXIS = 2".to_owned(),
                    ));
                }
                let naxis1 = check_for_naxisn(&header, 1)?;
                let naxis2 = check_for_naxisn(&header, 2)?;
                if check_for_pcount(&header)? != 0 {
                    return Err(Error::UnsupportedFits(
                        "binary table with a variable length array heap".to_owned(),
                    ));
                }
                if check_for_gcount(&header)? != 1 {
                    return Err(Error::InvalidFits(
                        "binary table HDU must have GCOUNT = 1".to_owned(),
                    ));
                }
                DataLayout::bintable(naxis1, naxis2)
            }
        };

        let data_size = layout.data_size();
        Ok(Self {
            kind,
            header_offset,
            data_offset: header_offset + header.byte_len(),
            data_size,
            data_len: padded_len(data_size),
            layout,
            header,
        })
    }

    /// Rebuild a descriptor from fields stored in a persisted index. The
    /// layout is trusted as stored, not recomputed.
    pub(crate) fn from_stored(
        kind: HduKind,
        header_offset: u64,
        header: Header,
        layout: DataLayout,
        data_size: u64,
        data_len: u64,
    ) -> Self {
        Self {
            kind,
            header_offset,
            data_offset: header_offset + header.byte_len(),
            data_size,
            data_len,
            layout,
            header,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The exact raw bytes of the header.
    pub fn header_bytes(&self) -> &[u8] {
        self.header.raw_bytes()
    }

    pub fn header_len(&self) -> u64 {
        self.header.byte_len()
    }

    pub fn header_stop(&self) -> u64 {
        self.header_offset + self.header_len()
    }

    pub fn data_stop(&self) -> u64 {
        self.data_offset + self.data_len
    }
}
