use std::error::Error;

use clap::Parser;

use crate::index::Index;

mod index;

// Avoid musl's default allocator due to lackluster performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(all(target_env = "musl", target_arch = "x86_64"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Index FITS files for partial cloud reads on the command line.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Scan a directory of FITS files and publish the cloud index
    #[clap(name = "index")]
    Index(Index),
}

impl Args {
    fn exec(self) -> Result<(), Box<dyn Error>> {
        match self {
            Self::Index(args) => args.exec(),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    args.exec()
}
