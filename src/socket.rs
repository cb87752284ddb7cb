use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::{io, mem};

/// Blocking netlink socket speaking to the netfilter subsystem.
pub struct NetlinkSocket {
    fd: OwnedFd,
    portid: u32,
}

impl NetlinkSocket {
    pub fn connect() -> io::Result<Self> {
        let fd = unsafe {
            let ret = libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_NETFILTER,
            );
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }

            // nl_pid of 0 lets the kernel assign a unique port id
            let mut addr = mem::zeroed::<libc::sockaddr_nl>();
            addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;

            let addr_ptr = &addr as *const libc::sockaddr_nl as *const libc::sockaddr;
            let addr_len = size_of::<libc::sockaddr_nl>() as libc::socklen_t;

            if libc::bind(ret, addr_ptr, addr_len) < 0 {
                let _ = libc::close(ret);

                return Err(io::Error::last_os_error());
            }

            OwnedFd::from_raw_fd(ret)
        };

        // fetch the assigned port id, responses are correlated against it
        let portid = unsafe {
            let mut addr = mem::zeroed::<libc::sockaddr_nl>();
            let mut addr_len = size_of::<libc::sockaddr_nl>() as libc::socklen_t;

            let ret = libc::getsockname(
                fd.as_raw_fd(),
                &mut addr as *mut libc::sockaddr_nl as *mut libc::sockaddr,
                &mut addr_len,
            );
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }

            addr.nl_pid
        };

        Ok(NetlinkSocket { fd, portid })
    }

    pub fn portid(&self) -> u32 {
        self.portid
    }

    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe {
            let mut addr = mem::zeroed::<libc::sockaddr_nl>();
            addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;

            libc::sendto(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };

        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(ret as usize)
    }

    /// Blocks until the next datagram arrives and copies it into `buf`.
    pub fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };

        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(ret as usize)
    }
}
