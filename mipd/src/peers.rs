//! Component F bookkeeping: the local `SOCK_SEQPACKET` listener and the two
//! peer roles accepted from it (§4.E "Accept", §4.F, §5 "Shared OS
//! resources").

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;

use mio::net::UnixStream as MioUnixStream;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use nix::sys::socket::{accept, bind, listen, socket, AddressFamily, SockFlag, SockType, UnixAddr};
use nix::unistd::unlink;

use mip_proto::config::LOCAL_LISTEN_BACKLOG;
use mip_proto::ipc::PeerIdentifier;

/// The local listening socket, bound `SOCK_SEQPACKET` per
/// `examples/original_source/src/ipc.c::create_unix_sock`.
pub struct LocalListener {
    fd: RawFd,
}

impl LocalListener {
    pub fn bind(path: &Path) -> anyhow::Result<LocalListener> {
        let _ = unlink(path); // reuse the path if a previous run left it behind
        let fd = socket(AddressFamily::Unix, SockType::SeqPacket, SockFlag::SOCK_NONBLOCK, None)?;
        let raw = std::os::fd::IntoRawFd::into_raw_fd(fd);
        let addr = UnixAddr::new(path)?;
        bind(raw, &addr)?;
        listen(&unsafe { BorrowedFd::borrow_raw(raw) }, LOCAL_LISTEN_BACKLOG as usize)?;
        Ok(LocalListener { fd: raw })
    }

    /// Accept one pending connection, reading its identifier byte and
    /// handing back a ready-to-register [`PeerConn`]. Returns `Ok(None)` if
    /// nothing is pending.
    pub fn accept_one(&self) -> anyhow::Result<Option<(PeerIdentifier, PeerConn)>> {
        let conn_fd = match accept(self.fd) {
            Ok(fd) => fd,
            Err(nix::errno::Errno::EAGAIN) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let std_stream = unsafe { StdUnixStream::from_raw_fd(conn_fd) };
        std_stream.set_nonblocking(true)?;

        let mut ident_buf = [0u8; 1];
        let n = match io::Read::read(&mut &std_stream, &mut ident_buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // First byte hasn't arrived yet; a SOCK_SEQPACKET peer that
                // writes its identifier as its very first message would
                // have to retry — in practice the identifier is the first
                // thing a well-behaved peer sends immediately on connect.
                0
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            anyhow::bail!("peer closed before sending an identifier byte");
        }

        let identifier = PeerIdentifier::from_byte(ident_buf[0])
            .ok_or_else(|| anyhow::anyhow!("unknown peer identifier byte {:#04x}", ident_buf[0]))?;

        Ok(Some((identifier, PeerConn::new(std_stream)?)))
    }
}

impl Drop for LocalListener {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl AsRawFd for LocalListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl mio::event::Source for LocalListener {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.fd).register(registry, token, interests)
    }
    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.fd).reregister(registry, token, interests)
    }
    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.fd).deregister(registry)
    }
}

/// An accepted peer connection (ping endpoint or routing daemon), wrapped
/// for `mio::Poll` registration and datagram-at-a-time reads.
pub struct PeerConn {
    pub stream: MioUnixStream,
}

impl PeerConn {
    fn new(std_stream: StdUnixStream) -> anyhow::Result<PeerConn> {
        Ok(PeerConn { stream: MioUnixStream::from_std(std_stream) })
    }

    /// Read one datagram-sized message. `Ok(None)` means the peer closed.
    pub fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; 2048];
        match io::Read::read(&mut self.stream, &mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Some(Vec::new())),
            Err(e) => Err(e),
        }
    }

    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.stream, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn accept_one_reads_the_identifier_and_classifies_the_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mip.sock");
        let listener = LocalListener::bind(&path).unwrap();

        let mut client = StdUnixStream::connect(&path).unwrap();
        client.write_all(&[PeerIdentifier::RoutingDaemon.to_byte()]).unwrap();

        // accept_one polls a non-blocking socket; give the kernel a moment
        // to complete the handshake before the first attempt.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let (identifier, _conn) = listener.accept_one().unwrap().expect("connection should be pending");
        assert_eq!(identifier, PeerIdentifier::RoutingDaemon);
    }

    #[test]
    fn accept_one_returns_none_when_nothing_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mip.sock");
        let listener = LocalListener::bind(&path).unwrap();
        assert!(listener.accept_one().unwrap().is_none());
    }
}
