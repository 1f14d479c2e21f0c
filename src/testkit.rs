//! Builders for small synthetic FITS files used across the test modules.

use crate::cutout::{card_int, card_logical, card_str, end_card, pad_to_block};
use crate::hdu::layout::Bitpix;

/// Lay raw card texts into space-padded 2880 byte blocks, verbatim.
pub(crate) fn raw_blocks(cards: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for text in cards {
        let mut card = [b' '; 80];
        card[..text.len()].copy_from_slice(text.as_bytes());
        out.extend_from_slice(&card);
    }
    pad_to_block(&mut out, b' ');
    out
}

/// A complete primary HDU without data (`NAXIS = 0`).
pub(crate) fn empty_primary() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&card_logical("SIMPLE", true));
    out.extend_from_slice(&card_int("BITPIX", 8));
    out.extend_from_slice(&card_int("NAXIS", 0));
    out.extend_from_slice(&end_card());
    pad_to_block(&mut out, b' ');
    out
}

/// An IMAGE extension. `naxisn` comes in FITS order (fastest first) and
/// `data` must hold exactly `byte_size * prod(naxisn)` big-endian bytes.
pub(crate) fn image_extension(bitpix: Bitpix, naxisn: &[u64], data: &[u8]) -> Vec<u8> {
    let expected: u64 = bitpix.byte_size() * naxisn.iter().product::<u64>();
    assert_eq!(data.len() as u64, expected, "bad test payload size");

    let mut out = Vec::new();
    out.extend_from_slice(&card_str("XTENSION", "IMAGE"));
    out.extend_from_slice(&card_int("BITPIX", bitpix.code()));
    out.extend_from_slice(&card_int("NAXIS", naxisn.len() as i64));
    for (i, len) in naxisn.iter().enumerate() {
        out.extend_from_slice(&card_int(&format!("NAXIS{}", i + 1), *len as i64));
    }
    out.extend_from_slice(&card_int("PCOUNT", 0));
    out.extend_from_slice(&card_int("GCOUNT", 1));
    out.extend_from_slice(&end_card());
    pad_to_block(&mut out, b' ');

    out.extend_from_slice(data);
    pad_to_block(&mut out, 0);
    out
}

/// A BINTABLE extension of `naxis2` rows of `naxis1` bytes.
pub(crate) fn bintable_hdu(naxis1: u64, naxis2: u64, data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len() as u64, naxis1 * naxis2, "bad test payload size");

    let mut out = Vec::new();
    out.extend_from_slice(&card_str("XTENSION", "BINTABLE"));
    out.extend_from_slice(&card_int("BITPIX", 8));
    out.extend_from_slice(&card_int("NAXIS", 2));
    out.extend_from_slice(&card_int("NAXIS1", naxis1 as i64));
    out.extend_from_slice(&card_int("NAXIS2", naxis2 as i64));
    out.extend_from_slice(&card_int("PCOUNT", 0));
    out.extend_from_slice(&card_int("GCOUNT", 1));
    out.extend_from_slice(&card_int("TFIELDS", 1));
    out.extend_from_slice(&card_str("TFORM1", &format!("{naxis1}B")));
    out.extend_from_slice(&end_card());
    pad_to_block(&mut out, b' ');

    out.extend_from_slice(data);
    pad_to_block(&mut out, 0);
    out
}

/// A big-endian f32 image payload whose element at flat index `i` is
/// `i as f32`, handy for checking which pixels a cutout picked.
pub(crate) fn f32_ramp(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len * 4);
    for i in 0..len {
        data.extend_from_slice(&(i as f32).to_be_bytes());
    }
    data
}
