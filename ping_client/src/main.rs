mod cli;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use clap::Parser;
use log::{error, info, LevelFilter};

use cli::Cli;
use mip_proto::config::PING_CLIENT_TIMEOUT;
use mip_proto::ipc::{PeerIdentifier, PingKind, PingRequest};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env().filter_level(LevelFilter::Info).format_timestamp_millis().init();

    if let Err(e) = run(cli) {
        error!("ping_client failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stream = UnixStream::connect(&cli.socket_lower)?;
    stream.write_all(&[PeerIdentifier::PingEndpoint.to_byte()])?;

    let req = PingRequest { dst_mip: cli.dst_mip, ttl: cli.ttl, kind: PingKind::Ping, payload: cli.message.into_bytes() };
    stream.write_all(&req.encode())?;
    info!("sent PING to MIP {}", cli.dst_mip);

    stream.set_read_timeout(Some(PING_CLIENT_TIMEOUT))?;
    let mut buf = vec![0u8; 2048];
    let n = match stream.read(&mut buf) {
        Ok(0) => anyhow::bail!("router closed the connection before replying"),
        Ok(n) => n,
        Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
            anyhow::bail!("no reply within {:?}", PING_CLIENT_TIMEOUT)
        }
        Err(e) => return Err(e.into()),
    };

    let reply = String::from_utf8_lossy(&buf[..n]);
    println!("{reply}");
    Ok(())
}
