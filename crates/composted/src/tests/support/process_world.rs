//! Process supervision test world shared across launch scenarios.

use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use composte_protocol::{Command, Reply};

use crate::health::HealthReporter;
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, run_daemon_with};
use crate::process::shutdown::{ShutdownError, ShutdownSignal};

use super::{
    FailingConfigLoader, RecordingHealthReporter, StepResult, TestConfigLoader, send_command,
};

pub struct ProcessTestWorld {
    loader: TestConfigLoader,
    pub reporter: Arc<RecordingHealthReporter>,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
    reply: Option<Reply>,
}

impl Default for ProcessTestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTestWorld {
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            shutdown: TestShutdownSignal::new(),
            handle: None,
            result: None,
            reply: None,
        }
    }

    pub fn start_background(&mut self) -> StepResult {
        if self.handle.is_some() {
            return Err(String::from("server already running"));
        }
        let plan = LaunchPlan {
            loader: self.loader.clone(),
            reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
            shutdown: self.shutdown.clone(),
        };
        self.handle = Some(thread::spawn(move || run_daemon_with(plan)));
        Ok(())
    }

    pub fn launch_with_invalid_config(&mut self) {
        let plan = LaunchPlan {
            loader: FailingConfigLoader,
            reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
            shutdown: self.shutdown.clone(),
        };
        self.result = Some(run_daemon_with(plan));
    }

    pub fn send(&mut self, command: &Command) -> StepResult {
        self.reply = Some(send_command(&self.loader.request_path(), command)?);
        Ok(())
    }

    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn join_background(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| String::from("server not running"))?;
        match handle.join() {
            Ok(result) => {
                self.result = Some(result);
                Ok(())
            }
            Err(_) => Err(String::from("server thread panicked")),
        }
    }

    pub fn result(&self) -> Option<&Result<(), LaunchError>> {
        self.result.as_ref()
    }

    pub fn request_socket_exists(&self) -> bool {
        self.loader.request_path().exists()
    }
}

impl Drop for ProcessTestWorld {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}

/// Process world fixture.
pub fn process_world() -> RefCell<ProcessTestWorld> {
    RefCell::new(ProcessTestWorld::new())
}
