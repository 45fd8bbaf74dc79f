//! Session collaborators that connect the wire envelope to the dispatcher.

use tracing::{debug, warn};

use composte_protocol::{Command, ProtocolError, Reply};

use super::DISPATCH_TARGET;
use super::dispatcher::Dispatcher;
use super::errors::GenericError;
use crate::engine::NotationEngine;
use crate::session::{Broadcaster, Handler, Preprocess};
use crate::store::ProjectStore;

/// Parses decrypted request text into a [`Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandParser;

impl Preprocess for CommandParser {
    type Output = Command;
    type Error = ProtocolError;

    fn preprocess(&self, message: String) -> Result<Command, ProtocolError> {
        Command::parse(&message)
    }
}

/// Applies commands to projects and broadcasts the successful ones.
#[derive(Debug)]
pub struct EditHandler<E, S> {
    dispatcher: Dispatcher<E>,
    store: S,
}

impl<E, S> EditHandler<E, S>
where
    E: NotationEngine,
    S: ProjectStore,
{
    /// Builds a handler over `dispatcher` and `store`.
    #[must_use]
    pub fn new(dispatcher: Dispatcher<E>, store: S) -> Self {
        Self { dispatcher, store }
    }

    /// Store edits are applied to.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn announce(&self, broadcaster: &dyn Broadcaster, command: &Command) {
        let envelope = match command.to_json() {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to encode broadcast");
                return;
            }
        };
        match broadcaster.broadcast(&envelope) {
            Ok(subscribers) => debug!(
                target: DISPATCH_TARGET,
                operation = %command.operation,
                subscribers,
                "edit broadcast"
            ),
            Err(error) => warn!(target: DISPATCH_TARGET, %error, "edit broadcast failed"),
        }
    }
}

impl<E, S> Handler<Command> for EditHandler<E, S>
where
    E: NotationEngine,
    S: ProjectStore,
{
    type Error = GenericError;

    fn handle(
        &self,
        broadcaster: &dyn Broadcaster,
        command: Command,
    ) -> Result<Reply, GenericError> {
        let reply = self
            .dispatcher
            .dispatch(&command, |project_id| self.store.fetch(project_id))
            .inspect_err(|error| {
                warn!(
                    target: DISPATCH_TARGET,
                    operation = %command.operation,
                    project = %command.project_id,
                    cause = %error.cause(),
                    "edit failed"
                );
            })?;
        if reply.is_ok() {
            self.announce(broadcaster, &command);
        }
        Ok(reply)
    }
}
