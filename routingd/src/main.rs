mod cli;
mod engine;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};

use cli::Cli;
use engine::RoutingState;
use mip_proto::config::HELLO_INTERVAL;
use mip_proto::ipc::PeerIdentifier;
use mip_proto::route_msg::RouteMessage;

fn main() {
    let cli = Cli::parse();
    let level = if cli.debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::from_default_env().filter_level(level).format_timestamp_millis().init();

    if let Err(e) = run(cli) {
        error!("routingd exiting: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stream = UnixStream::connect(&cli.socket_lower)?;
    stream.write_all(&[PeerIdentifier::RoutingDaemon.to_byte()])?;

    let mut local_mip_buf = [0u8; 1];
    stream.read_exact(&mut local_mip_buf)?;
    let local_mip = local_mip_buf[0];
    info!("connected to {}, local MIP address {local_mip}", cli.socket_lower.display());

    let write_stream = Arc::new(Mutex::new(stream.try_clone()?));
    let state = Arc::new(Mutex::new(RoutingState::new(local_mip)));

    let sender_state = state.clone();
    let sender_stream = write_stream.clone();
    thread::spawn(move || sender_loop(local_mip, sender_state, sender_stream));

    receiver_loop(local_mip, state, write_stream, stream)
}

/// Periodically announce liveness, propagate table changes, and withdraw
/// timed-out neighbours (§4.G "Sender loop"; `examples/original_source/src/routingd.c::sendMessagesThread`).
fn sender_loop(local_mip: u8, state: Arc<Mutex<RoutingState>>, stream: Arc<Mutex<UnixStream>>) {
    loop {
        send(&stream, RouteMessage::Hello { src: local_mip });

        let mut guard = state.lock().expect("routing state poisoned");
        let timed_out = guard.evict_timed_out_neighbors();
        let changed = guard.take_changed();
        let entries = guard.update_entries();
        drop(guard);

        if timed_out || changed {
            send(&stream, RouteMessage::Update { src: local_mip, entries });
        }

        thread::sleep(HELLO_INTERVAL);
    }
}

/// Handle `HEL`/`UPD`/`REQ` arriving from `mipd` (§4.G "Receiver loop").
fn receiver_loop(
    local_mip: u8,
    state: Arc<Mutex<RoutingState>>,
    write_stream: Arc<Mutex<UnixStream>>,
    mut read_stream: UnixStream,
) -> anyhow::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = read_stream.read(&mut buf)?;
        if n == 0 {
            anyhow::bail!("mipd closed the routing socket");
        }

        let msg = match RouteMessage::decode(&buf[..n]) {
            Ok(m) => m,
            Err(e) => {
                debug!("dropping malformed route message: {e}");
                continue;
            }
        };

        match msg {
            RouteMessage::Hello { src } => {
                state.lock().expect("routing state poisoned").handle_hello(src);
            }
            RouteMessage::Update { src, entries } => {
                state.lock().expect("routing state poisoned").handle_update(src, &entries);
            }
            RouteMessage::Request { destination, .. } => {
                let next_hop = state.lock().expect("routing state poisoned").resolve_next_hop(destination);
                send(&write_stream, RouteMessage::Response { src: local_mip, next_hop });
            }
            RouteMessage::Response { .. } => {
                warn!("unexpected RES arriving from mipd, ignoring");
            }
        }
    }
}

fn send(stream: &Arc<Mutex<UnixStream>>, msg: RouteMessage) {
    let mut guard = stream.lock().expect("route socket poisoned");
    if let Err(e) = guard.write_all(&msg.encode()) {
        warn!("failed to send route message: {e}");
    }
}
