//! AWS credentials and SigV4 request signing.
//!
//! Only what the object-store surface of this crate needs: path-style S3
//! GET/PUT requests signed over the `host` and `x-amz-date` headers,
//! plus `x-amz-request-payer` when reading requester-pays buckets.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::Error;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const AMZDATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATESTAMP_FORMAT: &str = "%Y%m%d";

/// Environment variable taking precedence over the credentials file
/// region.
pub(crate) const REGION_ENV: &str = "AWS_DEFAULT_REGION";
const DEFAULT_REGION: &str = "us-east-1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl Credentials {
    /// Read the `default` section of `~/.aws/credentials`.
    pub fn load() -> Result<Self, Error> {
        let home = std::env::var("HOME")
            .map_err(|_| Error::AuthFailure("HOME is not set".to_owned()))?;
        Self::from_file(Path::new(&home).join(".aws").join("credentials"))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = fs::read_to_string(&path).map_err(|err| {
            Error::AuthFailure(format!(
                "cannot read credentials file {}: {err}",
                path.as_ref().display()
            ))
        })?;
        Self::from_ini(&text)
    }

    /// Parse the shared-credentials INI format. The region may be
    /// overridden by `AWS_DEFAULT_REGION`.
    pub(crate) fn from_ini(text: &str) -> Result<Self, Error> {
        let mut section = String::new();
        let mut access_key = None;
        let mut secret_key = None;
        let mut region = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_owned();
                continue;
            }
            if section != "default" {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().to_owned();
                match key.trim() {
                    "aws_access_key_id" => access_key = Some(value),
                    "aws_secret_access_key" => secret_key = Some(value),
                    "region" => region = Some(value),
                    _ => (),
                }
            }
        }

        let access_key = access_key
            .ok_or_else(|| Error::AuthFailure("no aws_access_key_id in [default]".to_owned()))?;
        let secret_key = secret_key.ok_or_else(|| {
            Error::AuthFailure("no aws_secret_access_key in [default]".to_owned())
        })?;
        let region = std::env::var(REGION_ENV)
            .ok()
            .or(region)
            .unwrap_or_else(|| DEFAULT_REGION.to_owned());

        Ok(Self {
            access_key,
            secret_key,
            region,
        })
    }
}

/// Signs individual requests with a fixed set of credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    request_payer: bool,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            request_payer: false,
        }
    }

    /// Also sign and send `x-amz-request-payer: requester`, required to
    /// read requester-pays data buckets.
    pub fn with_request_payer(mut self) -> Self {
        self.request_payer = true;
        self
    }

    /// Sign with the current time.
    pub fn sign_now(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
    ) -> Result<Vec<(String, String)>, Error> {
        self.sign(method, url, body, Utc::now())
    }

    /// Produce the headers to attach to the request: `authorization`,
    /// `x-amz-date`, `x-amz-content-sha256` and, when enabled,
    /// `x-amz-request-payer`. The timestamp is a parameter so that the
    /// signature of a fixed request is reproducible.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
        at: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, Error> {
        let url = reqwest::Url::parse(url)
            .map_err(|err| Error::AuthFailure(format!("unsignable url {url}: {err}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::AuthFailure(format!("url {url} has no host")))?;

        let amz_date = at.format(AMZDATE_FORMAT).to_string();
        let datestamp = at.format(DATESTAMP_FORMAT).to_string();
        let payload_hash = hex::encode(Sha256::digest(body));

        // Canonical headers, sorted by name, each `name:value\n`.
        let mut headers = vec![("host", host.to_owned()), ("x-amz-date", amz_date.clone())];
        if self.request_payer {
            headers.push(("x-amz-request-payer", "requester".to_owned()));
        }
        let signed_names = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = [
            method,
            url.path(),
            canonical_query(&url).as_str(),
            canonical_headers.as_str(),
            signed_names.as_str(),
            payload_hash.as_str(),
        ]
        .join("\n");

        let scope = format!("{datestamp}/{}/{SERVICE}/aws4_request", self.credentials.region);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(
            &self.credentials.secret_key,
            &datestamp,
            &self.credentials.region,
            SERVICE,
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
            self.credentials.access_key
        );

        let mut out = vec![
            ("authorization".to_owned(), authorization),
            ("x-amz-date".to_owned(), amz_date),
            ("x-amz-content-sha256".to_owned(), payload_hash),
        ];
        if self.request_payer {
            out.push(("x-amz-request-payer".to_owned(), "requester".to_owned()));
        }
        Ok(out)
    }
}

/// Sorted, `&`-joined query parameters; empty when the url has none.
fn canonical_query(url: &reqwest::Url) -> String {
    match url.query() {
        None | Some("") => String::new(),
        Some(query) => {
            let mut parts: Vec<&str> = query.split('&').collect();
            parts.sort_unstable();
            parts.join("&")
        }
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::AuthFailure("unusable HMAC key".to_owned()))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
pub(crate) fn derive_signing_key(
    secret_key: &str,
    datestamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, Error> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), datestamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}
