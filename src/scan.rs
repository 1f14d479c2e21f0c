//! Structural scan of a FITS file.
//!
//! The scanner walks a seekable byte source block by block, parses every
//! header it meets and seeks over the data units, yielding one [`Hdu`]
//! descriptor per Header/Data Unit. Data bytes are never read.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Error;
use crate::hdu::header::Header;
use crate::hdu::{Hdu, BLOCK_SIZE};

/// An iterator over the HDUs of a FITS byte source.
#[derive(Debug)]
pub struct Scanner<R> {
    reader: R,
    /// Total source length, captured once to catch truncated data units.
    len: u64,
    pos: u64,
    index: usize,
    done: bool,
}

impl<R> Scanner<R>
where
    R: Read + Seek,
{
    /// Position `reader` at 0 and prepare a scan over the whole source.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::InvalidFits(format!(
                "file size {len} is not a multiple of 2880"
            )));
        }
        Ok(Self {
            reader,
            len,
            pos: 0,
            index: 0,
            done: false,
        })
    }

    fn next_hdu(&mut self) -> Result<Option<Hdu>, Error> {
        let mut block = [0u8; BLOCK_SIZE];
        if read_block(&mut self.reader, &mut block)?.is_none() {
            return Ok(None);
        }

        if &block[..8] != b"SIMPLE  " && &block[..8] != b"XTENSION" {
            return Err(Error::InvalidFits(format!(
                "no HDU opens at byte offset {}",
                self.pos
            )));
        }

        let header = Header::parse(block, &mut self.reader)?;
        let hdu = Hdu::from_header(self.pos, header, self.index == 0)?;

        if hdu.data_stop() > self.len {
            return Err(Error::InvalidFits(format!(
                "data unit of HDU {} runs past the end of the file",
                self.index
            )));
        }
        self.reader.seek(SeekFrom::Start(hdu.data_stop()))?;
        self.pos = hdu.data_stop();
        self.index += 1;

        log::debug!(
            "scanned {:?} HDU: header at {}, data [{}, {})",
            hdu.kind,
            hdu.header_offset,
            hdu.data_offset,
            hdu.data_stop()
        );
        Ok(Some(hdu))
    }
}

impl<R> Iterator for Scanner<R>
where
    R: Read + Seek,
{
    type Item = Result<Hdu, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_hdu() {
            Ok(Some(hdu)) => Some(Ok(hdu)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Scan a FITS file on disk into its list of HDU descriptors.
pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<Vec<Hdu>, Error> {
    let reader = BufReader::new(File::open(path)?);
    Scanner::new(reader)?.collect()
}

/// Read one full block, `None` on a clean end of file.
fn read_block<R: Read>(
    reader: &mut R,
    block: &mut [u8; BLOCK_SIZE],
) -> Result<Option<()>, Error> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = reader.read(&mut block[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    match filled {
        0 => Ok(None),
        BLOCK_SIZE => Ok(Some(())),
        _ => Err(Error::InvalidFits(
            "truncated block at the end of the file".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::Scanner;
    use crate::error::Error;
    use crate::hdu::layout::Bitpix;
    use crate::hdu::{HduKind, BLOCK_SIZE};
    use crate::testkit::{bintable_hdu, empty_primary, image_extension, raw_blocks};

    #[test]
    fn test_primary_only_file() {
        let file = empty_primary();
        let hdus: Vec<_> = Scanner::new(Cursor::new(file))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(hdus.len(), 1);
        assert_eq!(hdus[0].kind, HduKind::Primary);
        assert_eq!(hdus[0].data_size, 0);
        assert_eq!(hdus[0].data_len, 0);
        assert_eq!(hdus[0].data_offset, BLOCK_SIZE as u64);
    }

    #[test]
    fn test_image_and_bintable_extensions() {
        let mut file = empty_primary();
        let pixels = vec![0u8; 2 * 3 * 2]; // 3x2 i16 image
        file.extend(image_extension(Bitpix::I16, &[3, 2], &pixels));
        let rows = vec![1u8; 16 * 4];
        file.extend(bintable_hdu(16, 4, &rows));

        let hdus: Vec<_> = Scanner::new(Cursor::new(file))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(hdus.len(), 3);
        assert_eq!(hdus[0].kind, HduKind::Primary);
        assert_eq!(hdus[1].kind, HduKind::Image);
        assert_eq!(hdus[2].kind, HduKind::BinTable);

        // Indexer closure: block-aligned, strictly increasing spans.
        let mut previous_stop = 0;
        for hdu in &hdus {
            assert_eq!(hdu.data_offset % BLOCK_SIZE as u64, 0);
            assert_eq!(hdu.data_stop() % BLOCK_SIZE as u64, 0);
            assert_eq!(hdu.header_offset, previous_stop);
            assert!(hdu.data_stop() > hdu.header_offset);
            previous_stop = hdu.data_stop();
        }

        assert_eq!(hdus[1].data_size, 12);
        assert_eq!(hdus[1].data_len, BLOCK_SIZE as u64);
        assert_eq!(hdus[1].layout.shape, vec![2, 3]);
        assert_eq!(hdus[2].data_size, 64);
        assert_eq!(hdus[2].layout.shape, vec![4, 16]);
        assert_eq!(hdus[2].layout.strides, vec![16, 1]);
    }

    #[test]
    fn test_missing_end_card() {
        // A lone header block without the END card.
        let file = raw_blocks(&["SIMPLE  =                    T"]);
        let err = Scanner::new(Cursor::new(file))
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFits(_)));
    }

    #[test]
    fn test_primary_must_open_the_file() {
        let file = raw_blocks(&["XTENSION= 'IMAGE   '", "END"]);
        let err = Scanner::new(Cursor::new(file))
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFits(_)));
    }

    #[test]
    fn test_simple_false_is_rejected() {
        let file = raw_blocks(&[
            "SIMPLE  =                    F",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
            "END",
        ]);
        let err = Scanner::new(Cursor::new(file))
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFits(_)));
    }

    #[test]
    fn test_unsupported_bitpix() {
        let file = raw_blocks(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   24",
            "NAXIS   =                    0",
            "END",
        ]);
        let err = Scanner::new(Cursor::new(file))
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFits(_)));
    }

    #[test]
    fn test_not_a_fits_file() {
        let mut junk = vec![b'<'; BLOCK_SIZE];
        junk[..14].copy_from_slice(b"<!DOCTYPE html");
        let err = Scanner::new(Cursor::new(junk))
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFits(_)));
    }

    #[test]
    fn test_misaligned_file() {
        let file = vec![0u8; BLOCK_SIZE + 7];
        assert!(matches!(
            Scanner::new(Cursor::new(file)),
            Err(Error::InvalidFits(_))
        ));
    }

    #[test]
    fn test_truncated_data_unit() {
        let mut file = empty_primary();
        file.extend(image_extension(Bitpix::F32, &[64, 64], &[0u8; 64 * 64 * 4]));
        file.truncate(file.len() - BLOCK_SIZE);

        let mut scanner = Scanner::new(Cursor::new(file)).unwrap();
        assert!(scanner.next().unwrap().is_ok());
        assert!(matches!(
            scanner.next().unwrap(),
            Err(Error::InvalidFits(_))
        ));
    }
}
