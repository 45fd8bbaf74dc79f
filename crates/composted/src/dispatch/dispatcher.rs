//! Validates commands, runs the executor, and applies the result to a
//! project at the addressed granularity.

use tracing::{debug, info};

use composte_protocol::{Command, INVALID_OPERATION, Reply};

use super::DISPATCH_TARGET;
use super::errors::{EditFailure, GenericError};
use super::registry::OperationRegistry;
use crate::engine::{Alteration, NotationEngine};
use crate::store::{Project, StoreError};

/// Portion of a project an edit is applied to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Granularity {
    /// One location inside one part.
    Location {
        /// Addressed part.
        part: usize,
        /// Addressed document-time offset.
        offset: f64,
    },
    /// One whole part.
    Part {
        /// Addressed part.
        part: usize,
    },
    /// Every part.
    Project,
}

impl Granularity {
    /// Resolves the granularity from a command's optional location fields.
    ///
    /// # Errors
    ///
    /// Rejects negative or non-finite offsets, negative part indices, and an
    /// offset supplied without a part index.
    pub fn resolve(part_index: Option<i64>, offset: Option<f64>) -> Result<Self, EditFailure> {
        if let Some(offset) = offset
            && (!offset.is_finite() || offset < 0.0)
        {
            return Err(EditFailure::InvalidOffset { offset });
        }
        let part = part_index
            .map(|part_index| {
                usize::try_from(part_index).map_err(|_| EditFailure::NegativePart { part_index })
            })
            .transpose()?;
        match (part, offset) {
            (Some(part), Some(offset)) => Ok(Self::Location { part, offset }),
            (Some(part), None) => Ok(Self::Part { part }),
            (None, Some(offset)) => Err(EditFailure::OffsetWithoutPart { offset }),
            (None, None) => Ok(Self::Project),
        }
    }

    fn apply<P: Project>(self, project: &mut P, alteration: Alteration) -> Result<(), StoreError> {
        match self {
            Self::Location { part, offset } => {
                project.update_part_at_offset(part, offset, alteration)
            }
            Self::Part { part } => project.update_part(part, alteration),
            Self::Project => project.update_parts(alteration),
        }
    }
}

/// Routes commands through the operation registry to a notation engine.
#[derive(Debug)]
pub struct Dispatcher<E> {
    engine: E,
    registry: &'static OperationRegistry,
}

impl<E: NotationEngine> Dispatcher<E> {
    /// Builds a dispatcher over the standard operation registry.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_registry(engine, OperationRegistry::standard())
    }

    /// Builds a dispatcher over a custom registry.
    #[must_use]
    pub fn with_registry(engine: E, registry: &'static OperationRegistry) -> Self {
        Self { engine, registry }
    }

    /// Notation engine edits are forwarded to.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Dispatches one command.
    ///
    /// Unknown operations produce a `fail` reply without touching the engine
    /// or the store. Every later failure becomes a [`GenericError`]; no
    /// project is fetched unless the executor succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`GenericError`] for coercion failures, location contract
    /// violations, engine failures, and store failures.
    pub fn dispatch<P, F>(&self, command: &Command, fetch: F) -> Result<Reply, GenericError>
    where
        P: Project,
        F: FnOnce(&str) -> Result<P, StoreError>,
    {
        let Some(descriptor) = self.registry.lookup(&command.operation) else {
            info!(
                target: DISPATCH_TARGET,
                operation = %command.operation,
                "unknown operation"
            );
            return Ok(Reply::fail(INVALID_OPERATION));
        };

        let arguments = descriptor.coerce(&command.args).map_err(EditFailure::from)?;
        let granularity = Granularity::resolve(command.part_index, command.offset)?;
        let alteration = descriptor.execute(&self.engine, &arguments)?;
        debug!(
            target: DISPATCH_TARGET,
            operation = descriptor.name,
            project = %command.project_id,
            start = alteration.start,
            end = alteration.end,
            ?granularity,
            "edit executed"
        );

        let mut project = fetch(&command.project_id)?;
        granularity.apply(&mut project, alteration)?;
        Ok(Reply::ok(""))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some(1), Some(2.0), Granularity::Location { part: 1, offset: 2.0 })]
    #[case(Some(0), None, Granularity::Part { part: 0 })]
    #[case(None, None, Granularity::Project)]
    fn resolves_granularity(
        #[case] part_index: Option<i64>,
        #[case] offset: Option<f64>,
        #[case] expected: Granularity,
    ) {
        assert_eq!(
            Granularity::resolve(part_index, offset).expect("resolve"),
            expected
        );
    }

    #[rstest]
    #[case(Some(0), Some(-1.0))]
    #[case(Some(0), Some(f64::NAN))]
    #[case(Some(-1), None)]
    #[case(None, Some(1.0))]
    fn rejects_contract_violations(#[case] part_index: Option<i64>, #[case] offset: Option<f64>) {
        assert!(Granularity::resolve(part_index, offset).is_err());
    }
}
