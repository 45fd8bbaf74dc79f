//! Exclusive, non-blocking socket binding for channel endpoints.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, warn};

use composte_config::SocketEndpoint;

use super::{ConnectionStream, ListenerError, TRANSPORT_TARGET};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

/// Listener bound to one endpoint.
///
/// The reported endpoint carries the actual port when binding TCP port 0.
/// Dropping the listener removes its Unix socket file.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let bound = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(host, *port)?;
                let addr = listener
                    .local_addr()
                    .map_err(|source| ListenerError::LocalAddress { source })?;
                Self {
                    endpoint: SocketEndpoint::tcp(host.clone(), addr.port()),
                    listener: ListenerKind::Tcp(listener),
                }
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    let listener = bind_unix(path.as_std_path())?;
                    Self {
                        endpoint: endpoint.clone(),
                        listener: ListenerKind::Unix(listener),
                    }
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    return Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    });
                }
            }
        };

        // Dropping `bound` on failure removes the freshly created socket file.
        let nonblocking = match &bound.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        nonblocking.map_err(|source| ListenerError::NonBlocking { source })?;

        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %bound.endpoint,
            "socket bound"
        );
        Ok(bound)
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Accepts one pending connection without blocking.
    pub(crate) fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        match &self.listener {
            ListenerKind::Tcp(tcp) => match tcp.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(ConnectionStream::Tcp(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
            #[cfg(unix)]
            ListenerKind::Unix(unix) => match unix.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(ConnectionStream::Unix(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
        }
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        cleanup_unix_socket(&self.endpoint);
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %self.endpoint,
            "socket unbound"
        );
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        reclaim_stale_socket(path)?;
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

/// Removes a socket file left behind by a dead process, refusing live ones.
#[cfg(unix)]
fn reclaim_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
        path: display(),
        source,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::UnixInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            warn!(
                target: TRANSPORT_TARGET,
                path = %path.display(),
                "reclaiming stale unix socket"
            );
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: display(),
            source,
        }),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn accept_within(listener: &SocketListener, timeout: Duration) -> Option<ConnectionStream> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(stream) = listener.accept().expect("accept") {
                return Some(stream);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn tcp_port_zero_reports_the_bound_port() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        let SocketEndpoint::Tcp { port, .. } = listener.endpoint() else {
            panic!("expected a tcp endpoint");
        };
        assert_ne!(*port, 0);

        TcpStream::connect(("127.0.0.1", *port)).expect("connect client");
        assert!(accept_within(&listener, Duration::from_secs(2)).is_some());
    }

    #[test]
    fn accept_does_not_block_without_clients() {
        let listener =
            SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        assert!(listener.accept().expect("accept").is_none());
    }

    #[test]
    fn tcp_endpoints_bind_exclusively() {
        let first = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind");
        let error = SocketListener::bind(first.endpoint()).expect_err("second bind must fail");
        assert!(matches!(error, ListenerError::BindTcp { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_reclaims_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("requests.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        let listener = SocketListener::bind(&endpoint).expect("bind new listener");
        UnixStream::connect(&path).expect("connect unix client");
        drop(listener);
        assert!(!path.exists(), "dropping the listener removes the socket");
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("requests.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
        assert!(path.exists(), "a live socket is left untouched");
    }
}
