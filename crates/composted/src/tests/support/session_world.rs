//! Running-server scenario world for end-to-end session steps.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use composte_protocol::{Command, Reply};

use crate::bootstrap::{Daemon, bootstrap_with};
use crate::store::RecordedUpdate;

use super::{RecordingHealthReporter, StepResult, Subscriber, TestConfigLoader, round_trip, send_command};

/// Project every scenario command addresses.
pub const PROJECT_ID: &str = "demo";

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(2);

/// World holding a server whose session loop runs on a background thread.
pub struct SessionWorld {
    loader: TestConfigLoader,
    daemon: Option<Arc<Daemon>>,
    serving: Option<thread::JoinHandle<()>>,
    subscriber: Option<Subscriber>,
    last_command: Option<Command>,
    last_reply: Option<Reply>,
}

impl SessionWorld {
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            daemon: None,
            serving: None,
            subscriber: None,
            last_command: None,
            last_reply: None,
        }
    }

    /// Bootstraps the server and starts serving.
    pub fn start(&mut self) -> StepResult {
        if self.daemon.is_some() {
            return Err(String::from("server already running"));
        }
        let reporter = Arc::new(RecordingHealthReporter::default());
        let daemon =
            Arc::new(bootstrap_with(&self.loader, reporter).map_err(|error| error.to_string())?);
        let serving = Arc::clone(&daemon);
        self.serving = Some(thread::spawn(move || serving.serve()));
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Connects a broadcast subscriber and waits until the server sees it.
    pub fn subscribe(&mut self) -> StepResult {
        let daemon = self.daemon.as_ref().ok_or("server not running")?;
        let subscriber = Subscriber::connect(&self.loader.broadcast_path())?;
        let deadline = Instant::now() + SUBSCRIBE_TIMEOUT;
        while daemon.server().subscriber_count() == 0 {
            if Instant::now() >= deadline {
                return Err(String::from("subscriber was never registered"));
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.subscriber = Some(subscriber);
        Ok(())
    }

    /// Sends `command` and records the reply.
    pub fn send(&mut self, command: Command) -> StepResult {
        let reply = send_command(&self.loader.request_path(), &command)?;
        self.last_command = Some(command);
        self.last_reply = Some(reply);
        Ok(())
    }

    /// Sends a raw line and records the reply.
    pub fn send_raw(&mut self, line: &str) -> StepResult {
        self.last_reply = Some(round_trip(&self.loader.request_path(), line)?);
        Ok(())
    }

    pub fn last_reply(&self) -> Result<&Reply, String> {
        self.last_reply.as_ref().ok_or_else(|| String::from("no reply recorded"))
    }

    pub fn last_command(&self) -> Result<&Command, String> {
        self.last_command
            .as_ref()
            .ok_or_else(|| String::from("no command sent"))
    }

    /// Reads the next broadcast seen by the subscriber.
    pub fn next_broadcast(&mut self) -> Result<String, String> {
        self.subscriber
            .as_mut()
            .ok_or("no subscriber connected")?
            .next_message()
    }

    /// Updates applied to the scenario project.
    pub fn updates(&self) -> Result<Vec<RecordedUpdate>, String> {
        let daemon = self.daemon.as_ref().ok_or("server not running")?;
        Ok(daemon.store().updates(PROJECT_ID))
    }
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionWorld {
    fn drop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            daemon.stop();
        }
        if let Some(serving) = self.serving.take() {
            let _ = serving.join();
        }
    }
}

/// Session world fixture.
pub fn session_world() -> RefCell<SessionWorld> {
    RefCell::new(SessionWorld::new())
}
