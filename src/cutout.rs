//! Assembly of the output FITS file of a cutout.
//!
//! An image cutout gets a freshly synthesized primary header and an IMAGE
//! extension declaring the output shape, with the payload bytes kept
//! big-endian in the source element type. A bintable cutout re-emits the
//! source headers verbatim, with only the `NAXIS2` value patched in place
//! so the header length never changes.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::card::CARD_SIZE;
use crate::error::Error;
use crate::hdu::layout::Bitpix;
use crate::hdu::BLOCK_SIZE;

/// Written into the synthesized primary header of every image cutout.
const ORIGIN: &str = "cloudfits";
const MESSAGE: &str = "Generated cutout header";

fn card_of(text: &str) -> [u8; CARD_SIZE] {
    debug_assert!(text.len() <= CARD_SIZE, "card overflows 80 bytes");
    let mut card = [b' '; CARD_SIZE];
    card[..text.len()].copy_from_slice(text.as_bytes());
    card
}

pub(crate) fn card_logical(kw: &str, value: bool) -> [u8; CARD_SIZE] {
    let value = if value { 'T' } else { 'F' };
    card_of(&format!("{kw:<8}= {value:>20}"))
}

pub(crate) fn card_int(kw: &str, value: i64) -> [u8; CARD_SIZE] {
    card_of(&format!("{kw:<8}= {value:>20}"))
}

/// Fixed-format character string, quoted and padded to the FITS minimum
/// of eight characters.
pub(crate) fn card_str(kw: &str, value: &str) -> [u8; CARD_SIZE] {
    card_of(&format!("{kw:<8}= '{value:<8}'"))
}

pub(crate) fn end_card() -> [u8; CARD_SIZE] {
    card_of("END")
}

/// Pad `buf` to the next 2880 boundary with `fill` bytes.
pub(crate) fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % BLOCK_SIZE;
    if rem != 0 {
        buf.resize(buf.len() + BLOCK_SIZE - rem, fill);
    }
}

/// The primary header of a synthesized cutout file: no data of its own,
/// just the mandatory cards and a provenance note.
pub fn synthesized_primary_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(BLOCK_SIZE);
    header.extend_from_slice(&card_logical("SIMPLE", true));
    header.extend_from_slice(&card_int("BITPIX", 8));
    header.extend_from_slice(&card_int("NAXIS", 0));
    header.extend_from_slice(&card_str("ORIGIN", ORIGIN));
    header.extend_from_slice(&card_str("MESSAGE", MESSAGE));
    header.extend_from_slice(&end_card());
    pad_to_block(&mut header, b' ');
    header
}

/// The IMAGE extension header declaring a cutout of `shape`
/// (slow-to-fast); the NAXISn cards are emitted in FITS order, i.e.
/// reversed back to fastest first.
pub fn image_extension_header(bitpix: Bitpix, shape: &[u64]) -> Vec<u8> {
    let mut header = Vec::with_capacity(BLOCK_SIZE);
    header.extend_from_slice(&card_str("XTENSION", "IMAGE"));
    header.extend_from_slice(&card_int("BITPIX", bitpix.code()));
    header.extend_from_slice(&card_int("NAXIS", shape.len() as i64));
    for (i, len) in shape.iter().rev().enumerate() {
        header.extend_from_slice(&card_int(&format!("NAXIS{}", i + 1), *len as i64));
    }
    header.extend_from_slice(&card_int("PCOUNT", 0));
    header.extend_from_slice(&card_int("GCOUNT", 1));
    header.extend_from_slice(&end_card());
    pad_to_block(&mut header, b' ');
    header
}

/// Concatenate the fetched range payloads, in planner order, into a
/// complete output FITS file for an image cutout.
pub fn assemble_image(
    bitpix: Bitpix,
    shape: &[u64],
    parts: &[Vec<u8>],
) -> Result<Vec<u8>, Error> {
    let payload_len: u64 = parts.iter().map(|p| p.len() as u64).sum();
    let expected = bitpix.byte_size() * shape.iter().product::<u64>();
    if payload_len != expected {
        return Err(Error::InvalidFits(format!(
            "cutout payload holds {payload_len} bytes, shape wants {expected}"
        )));
    }

    let mut out = synthesized_primary_header();
    out.extend(image_extension_header(bitpix, shape));
    for part in parts {
        out.extend_from_slice(part);
    }
    pad_to_block(&mut out, 0);
    Ok(out)
}

/// Build the output FITS file for a bintable row cutout: the source
/// primary header verbatim, the source table header with `NAXIS2`
/// rewritten to the fetched row count, then the rows.
pub fn assemble_bintable(
    primary_header: &[u8],
    table_header: &[u8],
    rows: u64,
    payload: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut patched = table_header.to_vec();
    patch_card_int(&mut patched, "NAXIS2", rows as i64)?;

    let mut out = Vec::with_capacity(primary_header.len() + patched.len() + payload.len());
    out.extend_from_slice(primary_header);
    out.extend(patched);
    out.extend_from_slice(payload);
    pad_to_block(&mut out, 0);
    Ok(out)
}

/// Rewrite the value field of the first `kw` card in place. The card
/// comment and the overall header length are left untouched.
fn patch_card_int(header: &mut [u8], kw: &str, value: i64) -> Result<(), Error> {
    let mut keyword = [b' '; 8];
    keyword[..kw.len()].copy_from_slice(kw.as_bytes());

    for card in header.chunks_exact_mut(CARD_SIZE) {
        if card[..8] == keyword {
            let field = format!("{value:>20}");
            card[10..30].copy_from_slice(field.as_bytes());
            return Ok(());
        }
        if card[..8] == *b"END     " {
            break;
        }
    }
    Err(Error::InvalidFits(format!("no {kw} card to patch")))
}

/// A cutout payload decoded into typed big-endian elements.
#[derive(Debug, PartialEq)]
pub enum Pixels {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Interpret `bytes` as a big-endian array of the HDU element type.
pub fn decode_pixels(bitpix: Bitpix, bytes: &[u8]) -> Result<Pixels, Error> {
    if bytes.len() as u64 % bitpix.byte_size() != 0 {
        return Err(Error::InvalidFits(format!(
            "payload of {} bytes does not divide into {} byte elements",
            bytes.len(),
            bitpix.byte_size()
        )));
    }
    let n = bytes.len() / bitpix.byte_size() as usize;
    let mut rdr = Cursor::new(bytes);
    let pixels = match bitpix {
        Bitpix::U8 => Pixels::U8(bytes.to_vec()),
        Bitpix::I16 => {
            let mut out = vec![0i16; n];
            rdr.read_i16_into::<BigEndian>(&mut out)?;
            Pixels::I16(out)
        }
        Bitpix::I32 => {
            let mut out = vec![0i32; n];
            rdr.read_i32_into::<BigEndian>(&mut out)?;
            Pixels::I32(out)
        }
        Bitpix::I64 => {
            let mut out = vec![0i64; n];
            rdr.read_i64_into::<BigEndian>(&mut out)?;
            Pixels::I64(out)
        }
        Bitpix::F32 => {
            let mut out = vec![0f32; n];
            rdr.read_f32_into::<BigEndian>(&mut out)?;
            Pixels::F32(out)
        }
        Bitpix::F64 => {
            let mut out = vec![0f64; n];
            rdr.read_f64_into::<BigEndian>(&mut out)?;
            Pixels::F64(out)
        }
    };
    Ok(pixels)
}
