mod cli;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use clap::Parser;
use log::{error, info, warn, LevelFilter};

use cli::Cli;
use mip_proto::ipc::{PeerIdentifier, PingKind, PingRequest};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env().filter_level(LevelFilter::Info).format_timestamp_millis().init();

    if let Err(e) = run(cli) {
        error!("ping_server failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stream = UnixStream::connect(&cli.socket_lower)?;
    stream.write_all(&[PeerIdentifier::PingEndpoint.to_byte()])?;
    info!("connected to {}, waiting for PINGs", cli.socket_lower.display());

    let mut buf = vec![0u8; 2048];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            anyhow::bail!("router closed the connection");
        }

        let text = String::from_utf8_lossy(&buf[..n]);
        let Some(message) = text.strip_prefix("PING:") else {
            warn!("ignoring non-PING message: {text}");
            continue;
        };

        info!("received PING: {message}");
        let pong = PingRequest { dst_mip: 0, ttl: 0, kind: PingKind::Pong, payload: message.as_bytes().to_vec() };
        stream.write_all(&pong.encode())?;
    }
}
