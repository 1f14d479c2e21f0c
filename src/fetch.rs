//! The range fetcher: many concurrent ranged GETs against the object
//! store, reassembled in planner order.
//!
//! Transport is a trait seam so the retry/ordering machinery can be
//! exercised without a network. Each in-flight task carries its planner
//! index; completions land in an accumulator slot written exactly once,
//! whatever order the responses arrive in. The first range to exhaust
//! its retries fails the whole operation and the in-flight stream is
//! dropped, cancelling every outstanding sibling request.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::auth::RequestSigner;
use crate::error::Error;

/// Default number of requests in flight.
pub const DEFAULT_WORKERS: usize = 250;
/// Attempts per range before the whole operation fails.
const ATTEMPTS: u32 = 3;
/// Initial retry backoff, doubled on every further attempt.
const BACKOFF: Duration = Duration::from_millis(100);
/// Per-attempt timeout on the HTTP transport.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of one ranged GET: the HTTP status and the body.
#[derive(Debug, Clone)]
pub struct RangeResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// A transport able to read one byte range of a remote object.
///
/// An `Err` means the transport itself failed (connection error,
/// timeout); both that and a non-206 status are retried by the fetcher.
#[async_trait]
pub trait RangeRead {
    async fn read_range(&self, range: &Range<u64>) -> std::io::Result<RangeResponse>;
}

/// Ranged GETs over a signed S3 URL.
#[derive(Debug)]
pub struct S3RangeReader {
    client: reqwest::Client,
    url: reqwest::Url,
    signer: RequestSigner,
}

impl S3RangeReader {
    pub fn new(url: &str, signer: RequestSigner) -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
            url: parse_url(url)?,
            signer,
        })
    }
}

#[async_trait]
impl RangeRead for S3RangeReader {
    async fn read_range(&self, range: &Range<u64>) -> std::io::Result<RangeResponse> {
        let headers = self
            .signer
            .sign_now("GET", self.url.as_str(), b"")
            .map_err(io_other)?;

        let mut request = self
            .client
            .get(self.url.clone())
            // Half-open [start, stop) becomes the RFC 7233 inclusive
            // form only here, at the HTTP boundary.
            .header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.start, range.end - 1),
            )
            .header(reqwest::header::ACCEPT, "application/octet-stream");
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(io_other)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(io_other)?.to_vec();
        Ok(RangeResponse { status, body })
    }
}

/// Drives a [`RangeRead`] transport with bounded concurrency.
#[derive(Debug)]
pub struct RangeFetcher<R> {
    reader: R,
    workers: usize,
}

impl<R> RangeFetcher<R>
where
    R: RangeRead + Sync,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fetch every range and return the payloads in input order. Any
    /// range exhausting its retries fails the whole call; no partial
    /// result ever escapes.
    pub async fn fetch_ordered(&self, ranges: &[Range<u64>]) -> Result<Vec<Vec<u8>>, Error> {
        log::debug!(
            "fetching {} ranges, {} in flight at most",
            ranges.len(),
            self.workers
        );
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; ranges.len()];
        {
            let mut inflight = stream::iter(ranges.iter().enumerate().map(|(index, range)| {
                let range = range.clone();
                async move { (index, self.fetch_one(index, range).await) }
            }))
            .buffer_unordered(self.workers);

            while let Some((index, result)) = inflight.next().await {
                match result {
                    Ok(body) => slots[index] = Some(body),
                    // Dropping `inflight` cancels the outstanding siblings.
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| unreachable!("every range resolves exactly once")))
            .collect())
    }

    async fn fetch_one(&self, index: usize, range: Range<u64>) -> Result<Vec<u8>, Error> {
        if range.start == range.end {
            // An empty range has no valid inclusive form on the wire.
            return Ok(Vec::new());
        }
        let mut last_status = None;
        let mut backoff = BACKOFF;
        for attempt in 1..=ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.reader.read_range(&range).await {
                Ok(RangeResponse { status: 206, body }) => {
                    let expected = range.end - range.start;
                    if body.len() as u64 == expected {
                        return Ok(body);
                    }
                    log::warn!(
                        "range {index}: got {} bytes instead of {expected}",
                        body.len()
                    );
                    last_status = Some(206);
                }
                Ok(RangeResponse { status, .. }) => {
                    log::warn!("range {index} attempt {attempt}: HTTP status {status}");
                    last_status = Some(status);
                }
                Err(err) => {
                    log::warn!("range {index} attempt {attempt}: {err}");
                }
            }
        }
        Err(Error::FetchFailed {
            range: index,
            status: last_status,
        })
    }
}

/// Read planned ranges straight out of a local seekable source, in
/// planner order. The offline counterpart of [`RangeFetcher`].
pub fn read_ranges<R: Read + Seek>(
    reader: &mut R,
    ranges: &[Range<u64>],
) -> Result<Vec<Vec<u8>>, Error> {
    let mut parts = Vec::with_capacity(ranges.len());
    for range in ranges {
        reader.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        reader.read_exact(&mut buf)?;
        parts.push(buf);
    }
    Ok(parts)
}

/// Download a whole object, used for the persisted index document.
/// Anything but a 200 fails the operation.
pub async fn get_object(url: &str, signer: &RequestSigner) -> Result<Vec<u8>, Error> {
    let headers = signer.sign_now("GET", url, b"")?;
    let mut request = http_client()?.get(parse_url(url)?);
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.send().await.map_err(fetch_failed)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::FetchFailed {
            range: 0,
            status: Some(status),
        });
    }
    Ok(response.bytes().await.map_err(fetch_failed)?.to_vec())
}

/// Upload an object (the indexer publishing the index document).
pub async fn put_object(url: &str, body: Vec<u8>, signer: &RequestSigner) -> Result<(), Error> {
    let headers = signer.sign_now("PUT", url, &body)?;
    let mut request = http_client()?.put(parse_url(url)?).body(body);
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.send().await.map_err(fetch_failed)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::FetchFailed {
            range: 0,
            status: Some(status),
        });
    }
    Ok(())
}

fn http_client() -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(ATTEMPT_TIMEOUT)
        .build()
        .map_err(|err| Error::Io(std::io::Error::other(err)))
}

fn parse_url(url: &str) -> Result<reqwest::Url, Error> {
    reqwest::Url::parse(url).map_err(|err| Error::AuthFailure(format!("bad url {url}: {err}")))
}

fn io_other<E>(err: E) -> std::io::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    std::io::Error::other(err)
}

fn fetch_failed(err: reqwest::Error) -> Error {
    log::warn!("object request failed in transport: {err}");
    Error::FetchFailed {
        range: 0,
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::ops::Range;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{read_ranges, RangeFetcher, RangeRead, RangeResponse};
    use crate::error::Error;

    /// Per-range behavior of the mock transport, keyed by `range.start`.
    enum Script {
        /// Always answer with this HTTP status (and an empty body).
        Status(u16),
        /// Fail in transport for the first `n` attempts, then succeed.
        FlakyAttempts(u32),
    }

    struct MockTransport {
        object: Vec<u8>,
        scripts: HashMap<u64, Script>,
        /// Milliseconds of artificial latency per `range.start`.
        delays: HashMap<u64, u64>,
        attempts: Mutex<HashMap<u64, u32>>,
    }

    impl MockTransport {
        fn new(object: Vec<u8>) -> Self {
            Self {
                object,
                scripts: HashMap::new(),
                delays: HashMap::new(),
                attempts: Mutex::new(HashMap::new()),
            }
        }

        fn attempts_for(&self, start: u64) -> u32 {
            *self.attempts.lock().unwrap().get(&start).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl RangeRead for MockTransport {
        async fn read_range(&self, range: &Range<u64>) -> std::io::Result<RangeResponse> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let counter = attempts.entry(range.start).or_insert(0);
                *counter += 1;
                *counter
            };
            if let Some(ms) = self.delays.get(&range.start) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            match self.scripts.get(&range.start) {
                Some(Script::Status(status)) => Ok(RangeResponse {
                    status: *status,
                    body: Vec::new(),
                }),
                Some(Script::FlakyAttempts(n)) if attempt <= *n => Err(
                    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "flaky"),
                ),
                _ => Ok(RangeResponse {
                    status: 206,
                    body: self.object[range.start as usize..range.end as usize].to_vec(),
                }),
            }
        }
    }

    fn ranges_of(object_len: u64, chunk: u64) -> Vec<Range<u64>> {
        (0..object_len)
            .step_by(chunk as usize)
            .map(|start| start..(start + chunk).min(object_len))
            .collect()
    }

    #[tokio::test]
    async fn test_out_of_order_completions_reassemble_in_order() {
        let object: Vec<u8> = (0..=255).collect();
        let ranges = ranges_of(256, 32);

        let mut transport = MockTransport::new(object.clone());
        // Earlier ranges answer later.
        for (i, range) in ranges.iter().enumerate() {
            transport
                .delays
                .insert(range.start, (ranges.len() - i) as u64 * 10);
        }

        let fetcher = RangeFetcher::new(transport).with_workers(8);
        let parts = fetcher.fetch_ordered(&ranges).await.unwrap();

        assert_eq!(parts.len(), ranges.len());
        assert_eq!(parts.concat(), object);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let ranges = ranges_of(100, 20);
        let mut transport = MockTransport::new(vec![0u8; 100]);
        transport.scripts.insert(ranges[2].start, Script::Status(500));

        let fetcher = RangeFetcher::new(transport);
        let err = fetcher.fetch_ordered(&ranges).await.unwrap_err();
        match err {
            Error::FetchFailed { range, status } => {
                assert_eq!(range, 2);
                assert_eq!(status, Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fetcher.reader.attempts_for(ranges[2].start), 3);
    }

    #[tokio::test]
    async fn test_whole_object_status_is_rejected() {
        // A server ignoring the Range header answers 200; that is a
        // retryable error, never silently accepted.
        let ranges = ranges_of(10, 10);
        let mut transport = MockTransport::new(vec![1u8; 10]);
        transport.scripts.insert(0, Script::Status(200));

        let err = RangeFetcher::new(transport)
            .fetch_ordered(&ranges)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FetchFailed {
                range: 0,
                status: Some(200)
            }
        ));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let ranges = ranges_of(64, 16);
        let mut transport = MockTransport::new((0..64).collect());
        transport.scripts.insert(16, Script::FlakyAttempts(2));

        let fetcher = RangeFetcher::new(transport);
        let parts = fetcher.fetch_ordered(&ranges).await.unwrap();
        assert_eq!(parts[1], (16..32).collect::<Vec<u8>>());
        assert_eq!(fetcher.reader.attempts_for(16), 3);
    }

    #[tokio::test]
    async fn test_transport_error_exhaustion_has_no_status() {
        let ranges = ranges_of(16, 16);
        let mut transport = MockTransport::new(vec![0u8; 16]);
        transport.scripts.insert(0, Script::FlakyAttempts(u32::MAX));

        let err = RangeFetcher::new(transport)
            .fetch_ordered(&ranges)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FetchFailed {
                range: 0,
                status: None
            }
        ));
    }

    #[test]
    fn test_local_read_ranges() {
        let object: Vec<u8> = (0..=99).collect();
        let mut reader = Cursor::new(object);
        let parts = read_ranges(&mut reader, &[10..14, 0..2, 95..100]).unwrap();
        assert_eq!(parts, vec![vec![10, 11, 12, 13], vec![0, 1], vec![95, 96, 97, 98, 99]]);
    }
}
