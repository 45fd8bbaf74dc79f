//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use composte_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

const POLL_TIMEOUT_MS: u64 = 100;

/// Loader that provisions both Unix sockets under a temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    socket_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for sockets");
        Self {
            socket_dir: Arc::new(dir),
        }
    }

    /// Path of the request channel socket.
    pub fn request_path(&self) -> PathBuf {
        self.socket_dir.path().join("sockets").join("request.sock")
    }

    /// Path of the broadcast channel socket.
    pub fn broadcast_path(&self) -> PathBuf {
        self.socket_dir.path().join("sockets").join("broadcast.sock")
    }

    fn endpoint(path: PathBuf) -> SocketEndpoint {
        let text = path
            .into_os_string()
            .into_string()
            .expect("temporary socket path was not valid UTF-8");
        SocketEndpoint::unix(text)
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            request_socket: Self::endpoint(self.request_path()),
            broadcast_socket: Self::endpoint(self.broadcast_path()),
            poll_timeout_ms: POLL_TIMEOUT_MS,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("composted"),
            OsString::from("--request-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}

/// Loader whose request endpoint is already held by another listener.
pub struct OccupiedSocketLoader {
    holder: TcpListener,
    sockets: TestConfigLoader,
}

impl OccupiedSocketLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            holder: TcpListener::bind("127.0.0.1:0").expect("bind placeholder listener"),
            sockets: TestConfigLoader::new(),
        }
    }
}

impl ConfigLoader for OccupiedSocketLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let port = self
            .holder
            .local_addr()
            .expect("placeholder listener address")
            .port();
        Ok(Config {
            request_socket: SocketEndpoint::tcp("127.0.0.1", port),
            ..self.sockets.load()?
        })
    }
}
