use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};

use cloudfits::client::index_url;
use cloudfits::fetch::put_object;
use cloudfits::index::{CloudIndex, FileIndex, INDEX_KEY};
use cloudfits::{scan_file, Credentials, RequestSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Write the index document into the working directory
    Local,
    /// Upload the index document to the index bucket
    AwsBucket,
}

#[derive(Debug, Clone, Args)]
pub struct Index {
    /// Directory scanned recursively for .fits files.
    #[clap(long, value_name = "DIR")]
    pub fits_files_directory: PathBuf,

    /// Bucket receiving the generated index. The data bucket is often
    /// publicly hosted without write access, so the index lives in a
    /// bucket of its own.
    #[clap(long, value_name = "BUCKET")]
    pub index_bucket_name: String,

    /// Full s3://<bucket>/<prefix> under which the indexed files live.
    #[clap(long, value_name = "S3PATH")]
    pub data_bucket_path: String,

    #[clap(long, value_enum, default_value_t = Mode::Local)]
    pub mode: Mode,
}

impl Index {
    pub fn exec(self) -> Result<(), Box<dyn Error>> {
        if !self.data_bucket_path.starts_with("s3://") {
            return Err("--data-bucket-path is not a valid s3:// path".into());
        }

        let root = &self.fits_files_directory;
        let mut files = Vec::new();
        collect_fits_files(root, &mut files)?;
        files.sort();
        log::info!("found {} FITS files under {}", files.len(), root.display());

        let mut indices = Vec::with_capacity(files.len());
        for path in &files {
            log::info!("scanning {}", path.display());
            let hdus = scan_file(path)?;
            let cloudpath = path
                .strip_prefix(root)?
                .to_string_lossy()
                .replace('\\', "/");
            indices.push(FileIndex::new(&cloudpath, &hdus)?);
        }

        match self.mode {
            Mode::Local => {
                let region = std::env::var("AWS_DEFAULT_REGION")
                    .unwrap_or_else(|_| "us-east-1".to_owned());
                let doc = CloudIndex::new(
                    region,
                    self.index_bucket_name,
                    self.data_bucket_path,
                    indices,
                );
                fs::write(INDEX_KEY, doc.to_yaml()?)?;
                log::info!("wrote {INDEX_KEY}");
            }
            Mode::AwsBucket => {
                let credentials = Credentials::load()?;
                let doc = CloudIndex::new(
                    credentials.region.clone(),
                    self.index_bucket_name.clone(),
                    self.data_bucket_path,
                    indices,
                );
                let url = index_url(&credentials.region, &self.index_bucket_name);
                let body = doc.to_yaml()?.into_bytes();
                let signer = RequestSigner::new(credentials);

                log::info!("uploading index document to {url}");
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(put_object(&url, body, &signer))?;
            }
        }
        Ok(())
    }
}

fn collect_fits_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    let entries = fs::read_dir(dir).map_err(|err| {
        std::io::Error::new(
            err.kind(),
            format!("cannot read directory {}: {err}", dir.display()),
        )
    })?;
    for entry in entries {
        let path = entry
            .map_err(|err| {
                std::io::Error::new(
                    err.kind(),
                    format!("cannot read an entry of {}: {err}", dir.display()),
                )
            })?
            .path();
        if path.is_dir() {
            collect_fits_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "fits") {
            out.push(path);
        }
    }
    Ok(())
}
