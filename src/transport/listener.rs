use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use tokio::net::{TcpListener, UnixListener};

use super::{PeerAddr, Stream};

/// A pre-bound listening socket on either transport.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Adopts an already bound and listening descriptor.
    ///
    /// The descriptor must be a `SOCK_STREAM` socket of family `AF_UNIX`,
    /// `AF_INET` or `AF_INET6`. It is switched to non-blocking mode and
    /// registered with the current tokio runtime.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        let raw = fd.as_raw_fd();

        if socket_type(raw)? != libc::SOCK_STREAM {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a stream socket"));
        }

        match socket_family(raw)? {
            libc::AF_UNIX => {
                let std_listener = std::os::unix::net::UnixListener::from(fd);
                std_listener.set_nonblocking(true)?;
                Ok(Listener::Unix(UnixListener::from_std(std_listener)?))
            }
            libc::AF_INET | libc::AF_INET6 => {
                let std_listener = std::net::TcpListener::from(fd);
                std_listener.set_nonblocking(true)?;
                Ok(Listener::Tcp(TcpListener::from_std(std_listener)?))
            }
            family => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported address family {family}"),
            )),
        }
    }

    pub async fn accept(&self) -> io::Result<(Stream, PeerAddr)> {
        match self {
            Listener::Tcp(tcp) => {
                let (stream, addr) = tcp.accept().await?;
                Ok((Stream::Tcp(stream), PeerAddr::Tcp(addr)))
            }
            Listener::Unix(unix) => {
                let (stream, addr) = unix.accept().await?;
                Ok((Stream::Unix(stream), addr.into()))
            }
        }
    }

    /// Human readable local address for log lines.
    pub fn describe(&self) -> String {
        match self {
            Listener::Tcp(tcp) => match tcp.local_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => "tcp:<unknown>".to_string(),
            },
            Listener::Unix(unix) => match unix.local_addr() {
                Ok(addr) => PeerAddr::from(addr).to_string(),
                Err(_) => "unix:<unknown>".to_string(),
            },
        }
    }
}

impl From<TcpListener> for Listener {
    fn from(l: TcpListener) -> Self {
        Listener::Tcp(l)
    }
}

impl From<UnixListener> for Listener {
    fn from(l: UnixListener) -> Self {
        Listener::Unix(l)
    }
}

fn socket_family(fd: RawFd) -> io::Result<libc::c_int> {
    // SAFETY: sockaddr_storage is plain data and large enough for any family;
    // getsockname writes at most `len` bytes into it.
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut len)
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(storage.ss_family as libc::c_int)
}

fn socket_type(fd: RawFd) -> io::Result<libc::c_int> {
    let mut ty: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: SO_TYPE writes a single c_int into `ty`.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            (&mut ty as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ty)
}
