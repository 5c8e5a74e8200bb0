//! Component A: raw, Ethertype-filtered link I/O (§4.A).
//!
//! One `AF_PACKET`/`SOCK_RAW` socket bound to `ETH_P_MIP`, shared across
//! every enumerated interface; `sendto` targets a specific interface by
//! index, `recvfrom` reports which interface a frame arrived on. This is
//! the direct Rust analogue of `examples/original_source/src/ipc.c`'s
//! socket setup and `include/ether.h`'s `ETH_P_MIP`, built on `libc` (the
//! teacher already carries `libc` as a dependency) rather than a
//! higher-level packet-capture crate, so the socket's file descriptor can
//! be registered directly with `mio::Poll` — the single-threaded,
//! readiness-driven model `spec.md` §5 requires.

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use mip_proto::addr::{MacAddr, ETHERTYPE_MIP};

/// One enumerated, non-loopback interface.
#[derive(Debug, Clone)]
pub struct Interface {
    pub index: i32,
    pub name: String,
    pub mac: MacAddr,
}

/// Enumerate non-loopback interfaces, caching each one's link-layer
/// address. Failure here is fatal at startup (§4.A, §7).
pub fn enumerate_interfaces() -> anyhow::Result<Vec<Interface>> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;

    let mut by_name: std::collections::BTreeMap<String, Interface> = std::collections::BTreeMap::new();

    for addr in getifaddrs()? {
        if addr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        let Some(link) = addr.address.as_ref().and_then(|a| a.as_link_addr()) else {
            continue;
        };
        let Some(mac) = link.addr() else { continue };
        let index = link.ifindex() as i32;
        by_name
            .entry(addr.interface_name.clone())
            .or_insert(Interface { index, name: addr.interface_name, mac: MacAddr(mac) });
    }

    if by_name.is_empty() {
        anyhow::bail!("no usable (non-loopback) network interfaces found");
    }

    Ok(by_name.into_values().take(mip_proto::config::MAX_IF).collect())
}

/// The shared raw link socket.
pub struct RawLink {
    fd: RawFd,
}

impl RawLink {
    /// Open and bind a raw `ETH_P_MIP`-filtered socket, in non-blocking
    /// mode so it can sit behind `mio::Poll`.
    pub fn open() -> anyhow::Result<RawLink> {
        let protocol = (ETHERTYPE_MIP as u16).to_be();
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW | libc::SOCK_NONBLOCK, protocol as i32) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = 0; // bind to all interfaces

        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err.into());
        }

        Ok(RawLink { fd })
    }

    /// Transmit `frame` (a fully serialized link+MIP+SDU frame) out
    /// `iface_index`.
    pub fn send(&self, frame: &[u8], iface_index: i32) -> io::Result<()> {
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_ifindex = iface_index;
        addr.sll_protocol = (ETHERTYPE_MIP as u16).to_be();
        addr.sll_halen = 6;

        let rc = unsafe {
            libc::sendto(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Receive one frame. Returns `Ok(None)` on `EWOULDBLOCK`/`EAGAIN`
    /// (nothing currently queued — the caller should stop draining).
    pub fn recv(&self) -> io::Result<Option<(Vec<u8>, i32)>> {
        let mut buf = vec![0u8; 2048];
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        let rc = unsafe {
            libc::recvfrom(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut addr as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                &mut addr_len,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }

        buf.truncate(rc as usize);
        Ok(Some((buf, addr.sll_ifindex)))
    }
}

impl Drop for RawLink {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl AsRawFd for RawLink {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Source for RawLink {
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

/// A test double used by `mipd`'s integration tests, where binding a raw
/// `AF_PACKET` socket or enumerating real interfaces isn't possible in a
/// sandboxed CI environment (see `spec.md` §8 scenario tests in
/// `SPEC_FULL.md` §8).
#[cfg(test)]
pub mod fake {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// An in-process stand-in for [`super::RawLink`]: frames "sent" on one
    /// end of a pair are observed as "received" on the other.
    #[derive(Default)]
    pub struct FakeLink {
        pub sent: RefCell<Vec<(Vec<u8>, i32)>>,
        pub inbox: RefCell<VecDeque<(Vec<u8>, i32)>>,
    }

    impl FakeLink {
        pub fn new() -> FakeLink {
            FakeLink::default()
        }

        pub fn send(&self, frame: &[u8], iface_index: i32) {
            self.sent.borrow_mut().push((frame.to_vec(), iface_index));
        }

        pub fn push_inbound(&self, frame: Vec<u8>, iface_index: i32) {
            self.inbox.borrow_mut().push_back((frame, iface_index));
        }

        pub fn recv(&self) -> Option<(Vec<u8>, i32)> {
            self.inbox.borrow_mut().pop_front()
        }
    }
}
