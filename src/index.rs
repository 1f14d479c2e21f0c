//! The persisted index document, `cloud-fits.yaml`.
//!
//! One YAML blob per data bucket: bucket coordinates plus, per FITS
//! file, the exact header bytes and data spans of every HDU. The wire
//! schema is fixed at version `0.1.0`, including the historical
//! `indicies` spelling. Derived fields (shape, strides, element type)
//! are trusted as stored on load, not recomputed.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hdu::header::Header;
use crate::hdu::layout::{Bitpix, DataLayout};
use crate::hdu::{Hdu, HduKind};

/// Key of the index document within the index bucket.
pub const INDEX_KEY: &str = "cloud-fits.yaml";
/// The only schema version this reader accepts.
pub const VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudIndex {
    pub version: String,
    #[serde(rename = "aws-default-region")]
    pub region: String,
    #[serde(rename = "index-bucket-name")]
    pub index_bucket: String,
    #[serde(rename = "data-bucket-path")]
    pub data_bucket_path: String,
    #[serde(rename = "indicies")]
    pub indices: Vec<FileIndex>,
}

/// The index of one FITS file within the data bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndex {
    /// Path of the file relative to the data bucket prefix.
    pub cloudpath: String,
    pub filename: String,
    pub index_name: String,
    pub headers: Vec<HduEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HduEntry {
    pub header: HeaderSpan,
    pub data: DataSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSpan {
    pub offset: u64,
    pub length: u64,
    pub stop: u64,
    /// The raw header bytes, verbatim. FITS headers are ASCII text so
    /// they travel as a YAML string.
    pub whole: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpan {
    pub offset: u64,
    /// Block-padded span, `stop - offset`, a multiple of 2880.
    pub length: u64,
    pub stop: u64,
    /// Slow-to-fast axis lengths.
    pub shape: Vec<u64>,
    /// Byte stride per axis.
    pub strides: Vec<u64>,
    /// Exact payload size in bytes, before padding.
    pub size: u64,
    pub data_type: String,
}

impl CloudIndex {
    pub fn new(
        region: String,
        index_bucket: String,
        data_bucket_path: String,
        indices: Vec<FileIndex>,
    ) -> Self {
        Self {
            version: VERSION.to_owned(),
            region,
            index_bucket,
            data_bucket_path,
            indices,
        }
    }

    /// Parse and validate a persisted document. The version gate runs
    /// here, before anything touches the network.
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        let doc: CloudIndex = serde_yaml::from_str(text)
            .map_err(|err| Error::IndexCorrupt(format!("schema violation: {err}")))?;
        if doc.version != VERSION {
            return Err(Error::IndexCorrupt(format!(
                "version {} is not {VERSION}",
                doc.version
            )));
        }
        Ok(doc)
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl FileIndex {
    /// Build the index entry of one scanned file. `cloudpath` is the
    /// path relative to the data bucket prefix.
    pub fn new(cloudpath: &str, hdus: &[Hdu]) -> Result<Self, Error> {
        let filename = cloudpath
            .rsplit('/')
            .next()
            .unwrap_or(cloudpath)
            .to_owned();
        let index_name = filename
            .split_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&filename)
            .to_owned();
        let headers = hdus.iter().map(HduEntry::from_hdu).collect::<Result<_, _>>()?;
        Ok(Self {
            cloudpath: cloudpath.to_owned(),
            filename,
            index_name,
            headers,
        })
    }

    /// Materialize the stored entries back into HDU descriptors.
    pub fn hdus(&self) -> Result<Vec<Hdu>, Error> {
        self.headers.iter().map(HduEntry::to_hdu).collect()
    }
}

impl HduEntry {
    pub fn from_hdu(hdu: &Hdu) -> Result<Self, Error> {
        if !hdu.header_bytes().is_ascii() {
            return Err(Error::InvalidFits(
                "header contains non ASCII bytes".to_owned(),
            ));
        }
        let whole = String::from_utf8_lossy(hdu.header_bytes()).into_owned();
        Ok(Self {
            header: HeaderSpan {
                offset: hdu.header_offset,
                length: hdu.header_len(),
                stop: hdu.header_stop(),
                whole,
            },
            data: DataSpan {
                offset: hdu.data_offset,
                length: hdu.data_len,
                stop: hdu.data_stop(),
                shape: hdu.layout.shape.clone(),
                strides: hdu.layout.strides.clone(),
                size: hdu.data_size,
                data_type: data_type_name(hdu.layout.bitpix).to_owned(),
            },
        })
    }

    pub fn to_hdu(&self) -> Result<Hdu, Error> {
        let header = Header::from_raw(self.header.whole.clone().into_bytes())?;
        if header.byte_len() != self.header.length
            || self.header.stop != self.header.offset + self.header.length
            || self.data.offset != self.header.stop
            || self.data.stop != self.data.offset + self.data.length
        {
            return Err(Error::IndexCorrupt(
                "stored spans are inconsistent".to_owned(),
            ));
        }
        if self.data.shape.len() != self.data.strides.len() {
            return Err(Error::IndexCorrupt(
                "stored shape and strides disagree".to_owned(),
            ));
        }

        let kind = HduKind::of_header(&header, self.header.offset == 0)?;
        let layout = DataLayout {
            bitpix: data_type_from_name(&self.data.data_type)?,
            shape: self.data.shape.clone(),
            strides: self.data.strides.clone(),
        };
        Ok(Hdu::from_stored(
            kind,
            self.header.offset,
            header,
            layout,
            self.data.size,
            self.data.length,
        ))
    }
}

/// Persisted element type names.
fn data_type_name(bitpix: Bitpix) -> &'static str {
    match bitpix {
        Bitpix::U8 => "uint8",
        Bitpix::I16 => "int16",
        Bitpix::I32 => "int32",
        Bitpix::I64 => "int64",
        Bitpix::F32 => "float32",
        Bitpix::F64 => "float64",
    }
}

/// Accepts the legacy unsigned spellings older writers produced for the
/// 16 and 32 bit integer types.
fn data_type_from_name(name: &str) -> Result<Bitpix, Error> {
    match name {
        "uint8" => Ok(Bitpix::U8),
        "int16" | "uint16" => Ok(Bitpix::I16),
        "int32" | "uint32" => Ok(Bitpix::I32),
        "int64" => Ok(Bitpix::I64),
        "float32" => Ok(Bitpix::F32),
        "float64" => Ok(Bitpix::F64),
        other => Err(Error::IndexCorrupt(format!("unknown data_type {other:?}"))),
    }
}
