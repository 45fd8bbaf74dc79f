//! Server bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use composte_config::{Config, SocketPreparationError};

use crate::codec::{IdentityCodec, LoggingCodec};
use crate::dispatch::{CommandParser, Dispatcher, EditHandler};
use crate::engine::RangeEngine;
use crate::health::HealthReporter;
use crate::session::Server;
use crate::store::MemoryProjectStore;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ChannelError, TransportContext, TransportSettings};

/// Codec installed by [`bootstrap_with`].
pub type ServerCodec = LoggingCodec<IdentityCodec>;

/// Handler installed by [`bootstrap_with`].
pub type ServerHandler = EditHandler<RangeEngine, MemoryProjectStore>;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare server socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// A channel could not be bound.
    #[error("failed to bind server channels: {source}")]
    Channel {
        /// Underlying transport error.
        #[source]
        source: ChannelError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    server: Server<ServerCodec>,
    handler: ServerHandler,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The bound server.
    #[must_use]
    pub fn server(&self) -> &Server<ServerCodec> {
        &self.server
    }

    /// The project store edits are applied to.
    #[must_use]
    pub fn store(&self) -> &MemoryProjectStore {
        self.handler.store()
    }

    /// Runs the session loop until [`Daemon::stop`] is called.
    pub fn serve(&self) {
        self.server.serve(&CommandParser, &self.handler);
        self.reporter.server_stopped();
    }

    /// Stops the server; the running [`Daemon::serve`] returns shortly after.
    pub fn stop(&self) {
        if !self.server.is_stopped() {
            self.reporter.server_stopping();
        }
        self.server.stop();
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// Loads configuration, installs telemetry, prepares socket directories, and
/// binds both channels. Projects are created on first use.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match build(loader, Arc::clone(&reporter)) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn build(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    for endpoint in [config.request_socket(), config.broadcast_socket()] {
        endpoint
            .prepare_filesystem()
            .map_err(|source| BootstrapError::Socket { source })?;
    }

    let context = TransportContext::new(TransportSettings::from_config(&config));
    let server = Server::new(
        context,
        config.request_socket(),
        config.broadcast_socket(),
        LoggingCodec::new(IdentityCodec),
        config.poll_timeout(),
    )
    .map_err(|source| BootstrapError::Channel { source })?;
    let handler = EditHandler::new(
        Dispatcher::new(RangeEngine::new()),
        MemoryProjectStore::auto_create(),
    );

    Ok(Daemon {
        config,
        server,
        handler,
        telemetry,
        reporter,
    })
}
