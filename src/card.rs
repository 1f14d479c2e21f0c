//! Parsing of the 80 byte header cards.
//!
//! A card is a keyword (eight bytes, left justified), an optional value
//! indicator `"= "` followed by a value and an optional `/ comment`, or one
//! of the commentary forms (`COMMENT`, `HISTORY`, blank keyword).

use serde::Serialize;

use crate::error::Error;

/// A FITS header card is always 80 bytes long.
pub const CARD_SIZE: usize = 80;

pub type CardBuf = [u8; CARD_SIZE];

#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Card {
    /// A keyword/value pair, e.g. `NAXIS1  =                 2136`.
    Value { name: String, value: Value },
    Comment(String),
    History(String),
    /// Blank keyword, carries nothing the indexer cares about.
    Blank,
    /// The card closing a header, `END` padded with 77 spaces.
    End,
    /// A card that could not be interpreted. Kept verbatim so the raw
    /// header round-trips byte for byte.
    Undefined(String),
}

/// Enum structure corresponding to all the possible types a card value
/// can have that are supported by cloudfits.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub enum Value {
    Integer(i64),
    Logical(bool),
    String(String),
    Float(f64),
    Undefined,
}

impl Value {
    pub fn check_for_integer(self) -> Result<i64, Error> {
        match self {
            Value::Integer(num) => Ok(num),
            _ => Err(Error::InvalidFits("expected an integer value".to_owned())),
        }
    }
    pub fn check_for_boolean(self) -> Result<bool, Error> {
        match self {
            Value::Logical(logical) => Ok(logical),
            _ => Err(Error::InvalidFits("expected a logical value".to_owned())),
        }
    }
    pub fn check_for_string(self) -> Result<String, Error> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(Error::InvalidFits("expected a string value".to_owned())),
        }
    }
    pub fn check_for_float(self) -> Result<f64, Error> {
        match self {
            Value::Float(f) => Ok(f),
            _ => Err(Error::InvalidFits("expected a float value".to_owned())),
        }
    }
}

pub trait CardValue {
    fn parse(value: Value) -> Result<Self, Error>
    where
        Self: Sized;
}

impl CardValue for f64 {
    fn parse(value: Value) -> Result<Self, Error> {
        value.check_for_float()
    }
}
impl CardValue for i64 {
    fn parse(value: Value) -> Result<Self, Error> {
        value.check_for_integer()
    }
}
impl CardValue for String {
    fn parse(value: Value) -> Result<Self, Error> {
        value.check_for_string()
    }
}
impl CardValue for bool {
    fn parse(value: Value) -> Result<Self, Error> {
        value.check_for_boolean()
    }
}

impl From<&CardBuf> for Card {
    fn from(buf: &CardBuf) -> Self {
        let kw = trim_keyword(&buf[..8]);
        match kw {
            "END" if buf[3..].iter().all(|b| *b == b' ') => Card::End,
            "COMMENT" => Card::Comment(text_of(&buf[8..])),
            "HISTORY" => Card::History(text_of(&buf[8..])),
            "" => Card::Blank,
            _ if &buf[8..10] == b"= " => Card::Value {
                name: kw.to_owned(),
                value: parse_value(&buf[10..]),
            },
            _ => Card::Undefined(String::from_utf8_lossy(buf).into_owned()),
        }
    }
}

impl Card {
    /// `true` for the 80 byte card closing a header.
    pub fn is_end(buf: &CardBuf) -> bool {
        buf[..3] == *b"END" && buf[3..].iter().all(|b| *b == b' ')
    }
}

fn trim_keyword(bytes: &[u8]) -> &str {
    // Keywords are restricted to ASCII so a lossy check is enough here.
    std::str::from_utf8(bytes).unwrap_or("").trim_end_matches(' ')
}

fn text_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}

/// Parse the value field of a card, i.e. everything after the `"= "`
/// indicator. A trailing `/ comment` is discarded, the indexer keeps the
/// raw header bytes whenever a card must be read back verbatim.
pub(crate) fn parse_value(buf: &[u8]) -> Value {
    let mut i = 0;
    while i < buf.len() && buf[i] == b' ' {
        i += 1;
    }
    if i == buf.len() {
        return Value::Undefined;
    }
    match buf[i] {
        b'\'' => {
            let rest = &buf[i + 1..];
            match rest.iter().position(|b| *b == b'\'') {
                Some(end) => Value::String(String::from_utf8_lossy(&rest[..end]).into_owned()),
                None => Value::Undefined,
            }
        }
        b'T' if delimited_at(buf, i + 1) => Value::Logical(true),
        b'F' if delimited_at(buf, i + 1) => Value::Logical(false),
        _ => {
            let token: &[u8] = buf[i..]
                .split(|b| *b == b' ' || *b == b'/')
                .next()
                .unwrap_or(&[]);
            let token = String::from_utf8_lossy(token);
            if let Ok(int) = token.parse::<i64>() {
                Value::Integer(int)
            } else if let Ok(float) = token.parse::<f64>() {
                Value::Float(float)
            } else {
                Value::Undefined
            }
        }
    }
}

/// A logical constant must be followed by a space or a comment separator.
fn delimited_at(buf: &[u8], i: usize) -> bool {
    i >= buf.len() || buf[i] == b' ' || buf[i] == b'/'
}
