quick_error! {
    /// All failure modes surfaced by this crate.
    ///
    /// Retries never cross an operation boundary: the fetcher retries a
    /// single range internally, everything else propagates to the caller
    /// of the indexing or cutout operation.
    #[derive(Debug)]
    pub enum Error {
        /// Structural violation of the FITS standard (missing `END` card,
        /// misaligned block, missing mandatory keyword).
        InvalidFits(msg: String) {
            display("invalid FITS structure: {}", msg)
        }
        /// Well-formed FITS that this crate does not handle (non canonical
        /// BITPIX, ASCII tables, heap columns, GROUP files).
        UnsupportedFits(msg: String) {
            display("unsupported FITS feature: {}", msg)
        }
        /// User slice out of bounds, of the wrong rank, or with a non
        /// unit step.
        BadSlice(msg: String) {
            display("bad slice request: {}", msg)
        }
        /// Credentials file missing or unreadable, or a signing failure.
        AuthFailure(msg: String) {
            display("authentication failure: {}", msg)
        }
        /// A ranged read exhausted its retries. `status` is the last HTTP
        /// status observed, `None` if every attempt died in transport.
        FetchFailed { range: usize, status: Option<u16> } {
            display("range {} failed after retries (last status: {:?})", range, status)
        }
        /// The persisted index failed the schema or version check.
        IndexCorrupt(msg: String) {
            display("persisted index rejected: {}", msg)
        }
        Io(err: std::io::Error) {
            from()
            display("i/o error: {}", err)
            source(err)
        }
        Yaml(err: serde_yaml::Error) {
            from()
            display("yaml error: {}", err)
            source(err)
        }
    }
}
