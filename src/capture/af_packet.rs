//! Raw link-layer capture on Linux (AF_PACKET)

use super::Capture;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, warn};

/// `ETH_P_ALL` in network byte order, as the socket calls expect it
const ETH_P_ALL_BE: u16 = (libc::ETH_P_ALL as u16).to_be();

/// Raw socket bound to one interface, promiscuous while it lives
pub struct AfPacketSocket {
    async_fd: AsyncFd<OwnedFd>,
    ifindex: i32,
    local_mac: MacAddr,
}

impl AfPacketSocket {
    /// Open `ifname` using the interface's own hardware address
    pub fn bind(ifname: &str) -> Result<Self> {
        let mac = interface_mac(ifname)?;
        Self::bind_with_mac(ifname, mac)
    }

    /// Like [`AfPacketSocket::bind`] with an explicit source address
    pub fn bind_with_mac(ifname: &str, local_mac: MacAddr) -> Result<Self> {
        let ifindex = if_index(ifname)?;

        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                ETH_P_ALL_BE as libc::c_int,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // Owned from here on, so every early return closes it
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: ETH_P_ALL_BE,
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        })?;

        promiscuous(fd.as_raw_fd(), ifindex, libc::PACKET_ADD_MEMBERSHIP)?;
        let async_fd = AsyncFd::new(fd)?;

        debug!(ifname, ifindex, %local_mac, "AF_PACKET socket bound");
        Ok(Self {
            async_fd,
            ifindex,
            local_mac,
        })
    }

    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self
            .async_fd
            .async_io(Interest::READABLE, |fd| {
                cvt_len(unsafe {
                    libc::recv(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), 0)
                })
            })
            .await?;
        Ok(len)
    }

    pub async fn send(&self, frame: &[u8]) -> Result<usize> {
        let len = self
            .async_fd
            .async_io(Interest::WRITABLE, |fd| {
                cvt_len(unsafe {
                    libc::send(fd.as_raw_fd(), frame.as_ptr().cast(), frame.len(), 0)
                })
            })
            .await?;
        Ok(len)
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        let fd = self.async_fd.get_ref().as_raw_fd();
        if let Err(e) = promiscuous(fd, self.ifindex, libc::PACKET_DROP_MEMBERSHIP) {
            warn!(ifindex = self.ifindex, "Failed to leave promiscuous mode: {}", e);
        }
    }
}

impl Capture for AfPacketSocket {
    fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send_raw(&self, frame: &[u8]) -> Result<usize> {
        AfPacketSocket::send(self, frame).await
    }
}

/// Hardware address of `ifname` from sysfs
pub fn interface_mac(ifname: &str) -> Result<MacAddr> {
    let path = format!("/sys/class/net/{}/address", ifname);
    let content = std::fs::read_to_string(&path).map_err(|_| Error::InterfaceNotFound {
        name: ifname.to_string(),
    })?;
    content
        .trim()
        .parse()
        .map_err(|e| Error::Parse(format!("{}: {}", path, e)))
}

fn if_index(ifname: &str) -> Result<i32> {
    let not_found = || Error::InterfaceNotFound {
        name: ifname.to_string(),
    };
    let name = CString::new(ifname).map_err(|_| not_found())?;
    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => Err(not_found()),
        index => Ok(index as i32),
    }
}

/// Join or leave promiscuous membership on `ifindex`
fn promiscuous(fd: RawFd, ifindex: i32, op: libc::c_int) -> io::Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_PROMISC as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };
    cvt(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            op,
            &mreq as *const libc::packet_mreq as *const libc::c_void,
            mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    })
}

fn cvt(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn cvt_len(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}
