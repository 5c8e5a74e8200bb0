//! Command-line interface (§4.A "Startup arguments", §6).

use std::path::PathBuf;

use clap::Parser;

/// The MIP distance-vector routing daemon.
#[derive(Debug, Parser)]
#[command(name = "routingd", about = "MIP distance-vector routing daemon")]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Path of the local `SOCK_SEQPACKET` socket `mipd` is listening on.
    pub socket_lower: PathBuf,
}
