//! Listening side of an [`Endpoint`].
//!
//! Binding happens synchronously with `std` sockets so the caller sees bind
//! errors immediately; the socket is handed to tokio later, inside the
//! runtime that will accept on it.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::network::endpoint::{BoxedReader, Endpoint};

/// A bound socket not yet attached to a runtime.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(std::net::TcpListener),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixListener, SocketFile),
}

impl BoundListener {
    /// Bind `endpoint`. A leftover Unix socket file is removed first.
    pub fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = std::net::TcpListener::bind(addr.as_str())?;
                listener.set_nonblocking(true)?;
                Ok(BoundListener::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    debug!("removing stale socket {}", path.display());
                    std::fs::remove_file(path)?;
                }
                let listener = std::os::unix::net::UnixListener::bind(path)?;
                listener.set_nonblocking(true)?;
                Ok(BoundListener::Unix(listener, SocketFile(path.clone())))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    /// The endpoint actually bound, with the real port for `:0` binds.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            BoundListener::Tcp(l) => Ok(Endpoint::Tcp(l.local_addr()?.to_string())),
            #[cfg(unix)]
            BoundListener::Unix(_, file) => Ok(Endpoint::Unix(file.path().to_path_buf())),
        }
    }

    /// Attach to the current tokio runtime.
    pub fn into_async(self) -> io::Result<Listener> {
        match self {
            BoundListener::Tcp(l) => Ok(Listener::Tcp(tokio::net::TcpListener::from_std(l)?)),
            #[cfg(unix)]
            BoundListener::Unix(l, file) => Ok(Listener::Unix(
                tokio::net::UnixListener::from_std(l)?,
                file,
            )),
        }
    }
}

/// An async listener accepting one stream at a time.
#[derive(Debug)]
pub enum Listener {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, SocketFile),
}

impl Listener {
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Listener::Tcp(l) => Ok(Endpoint::Tcp(l.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix(_, file) => Ok(Endpoint::Unix(file.path().to_path_buf())),
        }
    }

    /// Accept the next client, returning its read half and a peer label.
    pub async fn accept(&self) -> io::Result<(BoxedReader, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::pin(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(l, file) => {
                let (stream, _) = l.accept().await?;
                Ok((Box::pin(stream), format!("unix:{}", file.path().display())))
            }
        }
    }
}

/// Unix socket path, unlinked when dropped.
#[derive(Debug)]
pub struct SocketFile(PathBuf);

impl SocketFile {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("could not remove {}: {}", self.0.display(), e);
            }
        }
    }
}
