//! Command-line interface: `ping_server [-h] <socket_lower>` (§6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ping_server", about = "Echo every received PING payload back as a PONG")]
pub struct Cli {
    /// Path of the local `SOCK_SEQPACKET` socket `mipd` is listening on.
    pub socket_lower: PathBuf,
}
