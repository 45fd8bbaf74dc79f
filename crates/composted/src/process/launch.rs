//! Supervises server launch sequencing and runtime orchestration.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the server runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the server using the production collaborators.
///
/// Signal handlers are installed before bootstrap so a signal arriving
/// while the channels bind still stops the server. Blocks until a
/// termination signal arrives and the session loop has drained the
/// in-flight request.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::install()?,
    })
}

/// Runs the server with injected collaborators.
///
/// The session loop runs on the calling thread. A watcher thread waits on
/// `shutdown` and stops the server. If the session loop panics the server
/// is stopped and the watcher is left detached, since it may be blocked on
/// a signal that never comes.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal + 'static,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting server runtime");
    let daemon = Arc::new(bootstrap_with(&loader, reporter)?);

    let watched = Arc::clone(&daemon);
    let watcher = thread::Builder::new()
        .name(String::from("composted-shutdown"))
        .spawn(move || {
            let outcome = shutdown.wait();
            watched.stop();
            outcome
        })
        .map_err(|source| {
            daemon.stop();
            LaunchError::Watcher { source }
        })?;

    if panic::catch_unwind(AssertUnwindSafe(|| daemon.serve())).is_err() {
        error!(target: PROCESS_TARGET, "session loop panicked; stopping server");
        daemon.stop();
        return Err(LaunchError::SessionPanicked);
    }

    watcher
        .join()
        .map_err(|_| LaunchError::WatcherPanicked)?
        .map_err(LaunchError::from)?;

    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
