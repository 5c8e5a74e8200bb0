//! Command-line interface: `ping_client [-h] <socket_lower> <dst_MIP> <message> <ttl>` (§6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ping_client", about = "Send one PING over MIP and wait for the PONG")]
pub struct Cli {
    /// Path of the local `SOCK_SEQPACKET` socket `mipd` is listening on.
    pub socket_lower: PathBuf,

    /// Destination MIP address, 0..254.
    #[arg(value_parser = parse_mip_addr)]
    pub dst_mip: u8,

    /// Message text to send.
    pub message: String,

    /// Time-to-live for the outgoing PING.
    pub ttl: u8,
}

fn parse_mip_addr(s: &str) -> Result<u8, String> {
    let value: u16 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value >= 0xFF {
        return Err(format!("MIP address must be in 0..254, got {value}"));
    }
    Ok(value as u8)
}
