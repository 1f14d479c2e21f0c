//! This crate implements partial, random-access reads of FITS files
//! kept in cloud object storage.
//!
//! A FITS file is scanned once into a small structural index (byte
//! offsets, raw header bytes and data layout of every HDU). The index is
//! persisted as a YAML sidecar next to the data bucket. A reader then
//! serves N-dimensional cutouts of image HDUs, or row ranges of binary
//! table HDUs, by translating the logical slice into byte ranges and
//! issuing many signed ranged GETs in parallel, without ever
//! downloading the whole file.
//!
//! # Examples
//!
//! Indexing and slicing a local file:
//!
//! ```no_run
//! use cloudfits::{LocalFits, View};
//!
//! let fits = LocalFits::open("samples/survey/field.fits").unwrap();
//! // Logical axes are slow-to-fast: [NAXISn, ..., NAXIS1].
//! let cutout = fits
//!     .image_cutout(1, &[View::slice(0, 250), View::slice(0, 250), View::at(50), View::at(0)])
//!     .unwrap();
//! std::fs::write("cutout.fits", cutout).unwrap();
//! ```
//!
//! The same slice against object storage only differs by the session
//! type ([`CloudFits`]), which loads the persisted index first and then
//! fans the byte ranges out over concurrent signed requests.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    clippy::uninlined_format_args,
    clippy::match_same_arms
)]

#[macro_use]
extern crate quick_error;

pub mod auth;
pub mod card;
pub mod client;
pub mod cutout;
pub mod error;
pub mod fetch;
pub mod hdu;
pub mod index;
pub mod scan;
pub mod slice;

#[cfg(test)]
pub(crate) mod testkit;

pub use auth::{Credentials, RequestSigner};
pub use client::{CloudFits, LocalFits};
pub use cutout::Pixels;
pub use error::Error;
pub use hdu::layout::{Bitpix, DataLayout};
pub use hdu::{Hdu, HduKind};
pub use index::{CloudIndex, FileIndex};
pub use scan::{scan_file, Scanner};
pub use slice::{CutoutPlan, View};
