//! Command-line interface (§4.A "Startup arguments", §6).

use std::path::PathBuf;

use clap::Parser;

/// The MIP router daemon.
#[derive(Debug, Parser)]
#[command(name = "mipd", about = "MIP router: link-layer forwarding, MIP-ARP, and local application IPC")]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Path of the local `SOCK_SEQPACKET` socket applications connect to.
    pub socket_upper: PathBuf,

    /// This node's MIP address, 0..254 (255 is reserved for broadcast).
    #[arg(value_parser = parse_mip_addr)]
    pub mip_addr: u8,
}

fn parse_mip_addr(s: &str) -> Result<u8, String> {
    let value: u16 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value >= 0xFF {
        return Err(format!("MIP address must be in 0..254, got {value}"));
    }
    Ok(value as u8)
}
