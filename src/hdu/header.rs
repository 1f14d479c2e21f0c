//! Reading of a whole header, i.e. the stream of 2880 byte blocks up to
//! and including the one carrying the `END` card.
//!
//! The exact header bytes are preserved: downstream consumers (the index
//! codec, the bintable cutout) must be able to read or re-emit a card
//! verbatim.

use std::io::Read;

use indexmap::IndexMap;

use crate::card::{Card, CardBuf, CardValue, Value, CARD_SIZE};
use crate::error::Error;
use crate::hdu::layout::Bitpix;
use crate::hdu::BLOCK_SIZE;

/// Card values keyed by keyword, in the order the cards appear.
///
/// If a keyword appears more than once the value of the last card wins.
pub type ValueMap = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The raw header bytes, a multiple of 2880.
    raw: Vec<u8>,
    values: ValueMap,
}

impl Header {
    /// Consume blocks from `reader` until the `END` card shows up.
    ///
    /// `first_block` has already been read by the scanner so it can decide
    /// whether a header starts at the current position at all.
    pub(crate) fn parse<R: Read>(
        first_block: [u8; BLOCK_SIZE],
        reader: &mut R,
    ) -> Result<Self, Error> {
        let mut raw = Vec::with_capacity(BLOCK_SIZE);
        raw.extend_from_slice(&first_block);

        let mut values = ValueMap::new();
        let mut closed = scan_block(&first_block, &mut values);

        while !closed {
            let start = raw.len();
            raw.resize(start + BLOCK_SIZE, 0);
            reader.read_exact(&mut raw[start..]).map_err(|_| {
                Error::InvalidFits("header runs past the end of the file (no END card)".to_owned())
            })?;
            let block: &[u8; BLOCK_SIZE] = raw[start..]
                .try_into()
                .expect("resized by exactly one block");
            closed = scan_block(block, &mut values);
        }

        Ok(Self { raw, values })
    }

    /// Rebuild a header from the raw bytes stored in a persisted index.
    pub(crate) fn from_raw(raw: Vec<u8>) -> Result<Self, Error> {
        if raw.is_empty() || raw.len() % BLOCK_SIZE != 0 {
            return Err(Error::IndexCorrupt(
                "stored header is not a multiple of 2880 bytes".to_owned(),
            ));
        }
        let mut values = ValueMap::new();
        let mut closed = false;
        for block in raw.chunks_exact(BLOCK_SIZE) {
            let block: &[u8; BLOCK_SIZE] = block.try_into().expect("chunks are exactly one block");
            closed = scan_block(block, &mut values);
            if closed {
                break;
            }
        }
        if !closed {
            return Err(Error::IndexCorrupt(
                "stored header has no END card".to_owned(),
            ));
        }
        Ok(Self { raw, values })
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn byte_len(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Get the value of a card, `None` if the keyword is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get the value of a card parsed into `T`.
    pub fn get_parsed<T>(&self, key: &str) -> Option<Result<T, Error>>
    where
        T: CardValue,
    {
        self.get(key).map(|value| T::parse(value.clone()))
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    /// Keyword field of the very first card, which discriminates the HDU
    /// kind.
    pub fn opening_keyword(&self) -> &[u8] {
        &self.raw[..8]
    }
}

/// Walk the 36 cards of one block. Returns `true` once `END` is found.
fn scan_block(block: &[u8; BLOCK_SIZE], values: &mut ValueMap) -> bool {
    for card in block.chunks_exact(CARD_SIZE) {
        let buf: &CardBuf = card.try_into().expect("chunks are exactly one card");
        if Card::is_end(buf) {
            return true;
        }
        match Card::from(buf) {
            Card::Value { name, value } => {
                values.insert(name, value);
            }
            Card::Undefined(text) => {
                log::warn!("skipping unparsable card: {:?}", text.trim_end());
            }
            _ => (),
        }
    }
    false
}

/* Mandatory keyword checks */

pub fn check_for_bitpix(header: &Header) -> Result<Bitpix, Error> {
    let code = header
        .get("BITPIX")
        .cloned()
        .ok_or_else(|| Error::InvalidFits("BITPIX keyword is missing".to_owned()))?
        .check_for_integer()?;
    Bitpix::from_code(code)
}

pub fn check_for_naxis(header: &Header) -> Result<usize, Error> {
    let naxis = header
        .get("NAXIS")
        .cloned()
        .ok_or_else(|| Error::InvalidFits("NAXIS keyword is missing".to_owned()))?
        .check_for_integer()?;
    if naxis < 0 {
        return Err(Error::InvalidFits("NAXIS is negative".to_owned()));
    }
    Ok(naxis as usize)
}

pub fn check_for_naxisn(header: &Header, i: usize) -> Result<u64, Error> {
    let kw = format!("NAXIS{i}");
    let size = header
        .get(&kw)
        .cloned()
        .ok_or_else(|| Error::InvalidFits(format!("{kw} keyword is missing")))?
        .check_for_integer()?;
    if size < 0 {
        return Err(Error::InvalidFits(format!("{kw} is negative")));
    }
    Ok(size as u64)
}

/// PCOUNT defaults to 0 when the card is absent (primary HDU).
pub fn check_for_pcount(header: &Header) -> Result<u64, Error> {
    match header.get("PCOUNT") {
        Some(value) => {
            let pcount = value.clone().check_for_integer()?;
            if pcount < 0 {
                return Err(Error::InvalidFits("PCOUNT is negative".to_owned()));
            }
            Ok(pcount as u64)
        }
        None => Ok(0),
    }
}

/// GCOUNT defaults to 1 when the card is absent (primary HDU).
pub fn check_for_gcount(header: &Header) -> Result<u64, Error> {
    match header.get("GCOUNT") {
        Some(value) => {
            let gcount = value.clone().check_for_integer()?;
            if gcount < 1 {
                return Err(Error::InvalidFits("GCOUNT is lower than 1".to_owned()));
            }
            Ok(gcount as u64)
        }
        None => Ok(1),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{check_for_bitpix, check_for_naxis, check_for_naxisn, Header};
    use crate::card::Value;
    use crate::error::Error;
    use crate::hdu::layout::Bitpix;
    use crate::hdu::BLOCK_SIZE;

    fn block_of(cards: &[&str]) -> [u8; BLOCK_SIZE] {
        let mut block = [b' '; BLOCK_SIZE];
        for (i, text) in cards.iter().enumerate() {
            block[i * 80..i * 80 + text.len()].copy_from_slice(text.as_bytes());
        }
        block
    }

    #[test]
    fn test_single_block_header() {
        let block = block_of(&[
            "SIMPLE  =                    T",
            "BITPIX  =                  -32",
            "NAXIS   =                    2",
            "NAXIS1  =                 2136",
            "NAXIS2  =                 2078",
            "END",
        ]);
        let header = Header::parse(block, &mut Cursor::new(&[][..])).unwrap();

        assert_eq!(header.byte_len(), BLOCK_SIZE as u64);
        assert_eq!(header.get("SIMPLE"), Some(&Value::Logical(true)));
        assert_eq!(check_for_bitpix(&header).unwrap(), Bitpix::F32);
        assert_eq!(check_for_naxis(&header).unwrap(), 2);
        assert_eq!(check_for_naxisn(&header, 1).unwrap(), 2136);
        assert_eq!(check_for_naxisn(&header, 2).unwrap(), 2078);
    }

    #[test]
    fn test_multi_block_header() {
        // 36 value cards fill the first block, END lands in the second.
        let cards: Vec<String> = (0..36)
            .map(|i| format!("CARD{i:<4}=                    {i}"))
            .collect();
        let refs: Vec<&str> = cards.iter().map(|c| c.as_str()).collect();
        let first = block_of(&refs);
        let second = block_of(&["END"]);

        let header = Header::parse(first, &mut Cursor::new(&second[..])).unwrap();
        assert_eq!(header.byte_len(), 2 * BLOCK_SIZE as u64);
        assert_eq!(header.get("CARD35"), Some(&Value::Integer(35)));
    }

    #[test]
    fn test_missing_end() {
        let block = block_of(&["SIMPLE  =                    T"]);
        let err = Header::parse(block, &mut Cursor::new(&[][..])).unwrap_err();
        assert!(matches!(err, Error::InvalidFits(_)));
    }

    #[test]
    fn test_last_value_wins() {
        let block = block_of(&[
            "SIMPLE  =                    T",
            "EXPTIME =                   10",
            "EXPTIME =                   20",
            "END",
        ]);
        let header = Header::parse(block, &mut Cursor::new(&[][..])).unwrap();
        assert_eq!(header.get("EXPTIME"), Some(&Value::Integer(20)));
    }
}
