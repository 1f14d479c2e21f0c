//! Read-side sessions over an indexed FITS file.
//!
//! [`CloudFits`] works against object storage: it loads the persisted
//! index document, then serves cutouts by fanning ranged GETs out over
//! the planner output. [`LocalFits`] is the offline counterpart reading
//! the same planned ranges from a file on disk.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::auth::{Credentials, RequestSigner, REGION_ENV};
use crate::cutout;
use crate::error::Error;
use crate::fetch::{self, RangeFetcher, S3RangeReader, DEFAULT_WORKERS};
use crate::hdu::Hdu;
use crate::index::{CloudIndex, INDEX_KEY};
use crate::scan::scan_file;
use crate::slice::{plan_image, plan_rows, View};

/// URL of the persisted index document within its bucket (path-style).
pub fn index_url(region: &str, index_bucket: &str) -> String {
    format!("https://s3.{region}.amazonaws.com/{index_bucket}/{INDEX_KEY}")
}

/// A cutout session against one indexed FITS file in object storage.
#[derive(Debug)]
pub struct CloudFits {
    region: String,
    data_bucket_path: String,
    cloudpath: String,
    hdus: Vec<Hdu>,
    credentials: Credentials,
    workers: usize,
}

impl CloudFits {
    /// Download `cloud-fits.yaml` from the index bucket and open a
    /// session on the file it indexes.
    pub async fn connect(index_bucket: &str, credentials: Credentials) -> Result<Self, Error> {
        let signer = RequestSigner::new(credentials.clone());
        let url = index_url(&credentials.region, index_bucket);
        log::info!("downloading index document from {url}");
        let blob = fetch::get_object(&url, &signer).await?;
        let text = String::from_utf8(blob)
            .map_err(|_| Error::IndexCorrupt("index document is not valid UTF-8".to_owned()))?;
        Self::from_document(CloudIndex::from_yaml(&text)?, credentials)
    }

    /// Open a session from an already loaded index document. The
    /// session addresses the first indexed file.
    pub fn from_document(doc: CloudIndex, credentials: Credentials) -> Result<Self, Error> {
        let entry = doc
            .indices
            .first()
            .ok_or_else(|| Error::IndexCorrupt("index holds no file entries".to_owned()))?;
        let hdus = entry.hdus()?;
        let region = std::env::var(REGION_ENV).ok().unwrap_or(doc.region);
        Ok(Self {
            region,
            data_bucket_path: doc.data_bucket_path,
            cloudpath: entry.cloudpath.clone(),
            hdus,
            credentials,
            workers: DEFAULT_WORKERS,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    /// Cut `views` out of the image HDU at `hdu_index` and return the
    /// synthesized output FITS file.
    pub async fn image_cutout(&self, hdu_index: usize, views: &[View]) -> Result<Vec<u8>, Error> {
        let hdu = self.hdu(hdu_index)?;
        let plan = plan_image(hdu, views)?;
        let ranges = plan.coalesced();
        log::info!(
            "image cutout over HDU {hdu_index}: {} ranges, {} bytes",
            ranges.len(),
            plan.byte_len()
        );
        let parts = self.fetcher()?.fetch_ordered(&ranges).await?;
        cutout::assemble_image(hdu.layout.bitpix, &plan.shape, &parts)
    }

    /// Fetch rows of the bintable HDU at `hdu_index` and return an
    /// output FITS file with the source headers and a patched `NAXIS2`.
    pub async fn table_rows(&self, hdu_index: usize, rows: View) -> Result<Vec<u8>, Error> {
        let hdu = self.hdu(hdu_index)?;
        let plan = plan_rows(hdu, rows)?;
        log::info!(
            "table cutout over HDU {hdu_index}: {} rows, {} bytes",
            plan.rows,
            plan.range.end - plan.range.start
        );
        let parts = self
            .fetcher()?
            .fetch_ordered(std::slice::from_ref(&plan.range))
            .await?;
        cutout::assemble_bintable(
            self.hdus[0].header_bytes(),
            hdu.header_bytes(),
            plan.rows,
            &parts[0],
        )
    }

    fn hdu(&self, index: usize) -> Result<&Hdu, Error> {
        self.hdus
            .get(index)
            .ok_or_else(|| Error::BadSlice(format!("file has no HDU {index}")))
    }

    fn fetcher(&self) -> Result<RangeFetcher<S3RangeReader>, Error> {
        // Data buckets are read with requester-pays signing.
        let signer = RequestSigner::new(self.credentials.clone()).with_request_payer();
        let reader = S3RangeReader::new(&self.data_url()?, signer)?;
        Ok(RangeFetcher::new(reader).with_workers(self.workers))
    }

    pub(crate) fn data_url(&self) -> Result<String, Error> {
        let path = self
            .data_bucket_path
            .strip_prefix("s3://")
            .ok_or_else(|| {
                Error::IndexCorrupt("data-bucket-path does not start with s3://".to_owned())
            })?
            .trim_matches('/');
        Ok(format!(
            "https://s3.{}.amazonaws.com/{path}/{}",
            self.region, self.cloudpath
        ))
    }
}

/// Cutouts served from a FITS file on the local filesystem, planned
/// exactly like the remote path.
#[derive(Debug)]
pub struct LocalFits {
    path: PathBuf,
    hdus: Vec<Hdu>,
}

impl LocalFits {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let hdus = scan_file(&path)?;
        Ok(Self {
            path: path.as_ref().to_owned(),
            hdus,
        })
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn image_cutout(&self, hdu_index: usize, views: &[View]) -> Result<Vec<u8>, Error> {
        let hdu = self.hdu(hdu_index)?;
        let plan = plan_image(hdu, views)?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let parts = fetch::read_ranges(&mut reader, &plan.coalesced())?;
        cutout::assemble_image(hdu.layout.bitpix, &plan.shape, &parts)
    }

    pub fn table_rows(&self, hdu_index: usize, rows: View) -> Result<Vec<u8>, Error> {
        let hdu = self.hdu(hdu_index)?;
        let plan = plan_rows(hdu, rows)?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let parts = fetch::read_ranges(&mut reader, std::slice::from_ref(&plan.range))?;
        cutout::assemble_bintable(
            self.hdus[0].header_bytes(),
            hdu.header_bytes(),
            plan.rows,
            &parts[0],
        )
    }

    fn hdu(&self, index: usize) -> Result<&Hdu, Error> {
        self.hdus
            .get(index)
            .ok_or_else(|| Error::BadSlice(format!("file has no HDU {index}")))
    }
}
