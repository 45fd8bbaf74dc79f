//! Static table of registered edit operations.
//!
//! Each [`OperationDescriptor`] names an operation, lists the kinds its raw
//! wire arguments coerce to, and points at the executor that forwards the
//! typed arguments to the notation engine. The table is built at compile time
//! and never changes.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use super::errors::EditFailure;
use crate::engine::{Alteration, NotationEngine};

/// Kind a raw argument is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Finite 64-bit float.
    Float,
    /// Signed 64-bit integer.
    Int,
    /// Text passed through unchanged.
    Text,
    /// Nested JSON document. No standard operation takes one; it is there
    /// for registries built with [`OperationRegistry::new`] and read back
    /// with [`Arguments::document`].
    Document,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Text => "text",
            Self::Document => "document",
        })
    }
}

/// Coerced argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Finite float.
    Float(f64),
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
    /// JSON document.
    Document(Value),
}

impl ArgValue {
    /// Kind of the coerced value.
    #[must_use]
    pub const fn kind(&self) -> ArgKind {
        match self {
            Self::Float(_) => ArgKind::Float,
            Self::Int(_) => ArgKind::Int,
            Self::Text(_) => ArgKind::Text,
            Self::Document(_) => ArgKind::Document,
        }
    }
}

/// Errors raised while coercing or reading arguments.
#[derive(Debug, Error)]
pub enum CoercionError {
    /// The number of raw arguments did not match the descriptor.
    #[error("expected {expected} arguments, got {actual}")]
    Arity {
        /// Declared argument count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },
    /// A float argument did not parse to a finite number.
    #[error("argument {index} ('{raw}') is not a finite number")]
    Float {
        /// Argument position.
        index: usize,
        /// Raw wire value.
        raw: String,
    },
    /// An integer argument did not parse.
    #[error("argument {index} ('{raw}') is not an integer")]
    Int {
        /// Argument position.
        index: usize,
        /// Raw wire value.
        raw: String,
    },
    /// A document argument was not valid JSON.
    #[error("argument {index} is not a JSON document: {message}")]
    Document {
        /// Argument position.
        index: usize,
        /// Parser message.
        message: String,
    },
    /// An executor read an argument that is absent.
    #[error("argument {index} is missing")]
    Missing {
        /// Argument position.
        index: usize,
    },
    /// An executor read an argument as the wrong kind.
    #[error("argument {index} is {actual}, expected {expected}")]
    Kind {
        /// Argument position.
        index: usize,
        /// Kind the executor asked for.
        expected: ArgKind,
        /// Kind the argument holds.
        actual: ArgKind,
    },
    /// An integer argument used as a part index was negative.
    #[error("argument {index} ({value}) is not a valid part index")]
    Part {
        /// Argument position.
        index: usize,
        /// Offending value.
        value: i64,
    },
}

impl ArgKind {
    /// Coerces the raw wire string at position `index`.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] naming the argument when it does not parse.
    pub fn coerce(self, index: usize, raw: &str) -> Result<ArgValue, CoercionError> {
        match self {
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(ArgValue::Float)
                .ok_or_else(|| CoercionError::Float {
                    index,
                    raw: raw.to_owned(),
                }),
            Self::Int => raw
                .trim()
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| CoercionError::Int {
                    index,
                    raw: raw.to_owned(),
                }),
            Self::Text => Ok(ArgValue::Text(raw.to_owned())),
            Self::Document => serde_json::from_str(raw)
                .map(ArgValue::Document)
                .map_err(|error| CoercionError::Document {
                    index,
                    message: error.to_string(),
                }),
        }
    }
}

/// Typed arguments produced by coercing a raw argument list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arguments {
    values: Vec<ArgValue>,
}

impl Arguments {
    /// Coerces `raw` against `kinds`, position by position.
    ///
    /// # Errors
    ///
    /// Fails on an arity mismatch or on the first argument that does not
    /// coerce.
    pub fn coerce(kinds: &[ArgKind], raw: &[String]) -> Result<Self, CoercionError> {
        if kinds.len() != raw.len() {
            return Err(CoercionError::Arity {
                expected: kinds.len(),
                actual: raw.len(),
            });
        }
        let values = kinds
            .iter()
            .zip(raw)
            .enumerate()
            .map(|(index, (kind, value))| kind.coerce(index, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    /// Coerced values in declaration order.
    #[must_use]
    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    fn get(&self, index: usize) -> Result<&ArgValue, CoercionError> {
        self.values
            .get(index)
            .ok_or(CoercionError::Missing { index })
    }

    fn mismatch(index: usize, expected: ArgKind, value: &ArgValue) -> CoercionError {
        CoercionError::Kind {
            index,
            expected,
            actual: value.kind(),
        }
    }

    /// Reads a float argument.
    pub fn float(&self, index: usize) -> Result<f64, CoercionError> {
        match self.get(index)? {
            ArgValue::Float(value) => Ok(*value),
            other => Err(Self::mismatch(index, ArgKind::Float, other)),
        }
    }

    /// Reads an integer argument.
    pub fn int(&self, index: usize) -> Result<i64, CoercionError> {
        match self.get(index)? {
            ArgValue::Int(value) => Ok(*value),
            other => Err(Self::mismatch(index, ArgKind::Int, other)),
        }
    }

    /// Reads a text argument.
    pub fn text(&self, index: usize) -> Result<&str, CoercionError> {
        match self.get(index)? {
            ArgValue::Text(value) => Ok(value),
            other => Err(Self::mismatch(index, ArgKind::Text, other)),
        }
    }

    /// Reads a document argument.
    pub fn document(&self, index: usize) -> Result<&Value, CoercionError> {
        match self.get(index)? {
            ArgValue::Document(value) => Ok(value),
            other => Err(Self::mismatch(index, ArgKind::Document, other)),
        }
    }

    /// Reads an integer argument as a part index.
    pub fn part(&self, index: usize) -> Result<usize, CoercionError> {
        let value = self.int(index)?;
        usize::try_from(value).map_err(|_| CoercionError::Part { index, value })
    }
}

/// Forwards typed arguments to the notation engine.
pub type Executor = fn(&dyn NotationEngine, &Arguments) -> Result<Alteration, EditFailure>;

/// Immutable description of one registered operation.
#[derive(Clone, Copy)]
pub struct OperationDescriptor {
    /// Wire name, matched case-sensitively.
    pub name: &'static str,
    /// Argument kinds in positional order.
    pub arguments: &'static [ArgKind],
    /// Executor invoked with the coerced arguments.
    pub executor: Executor,
}

impl OperationDescriptor {
    /// Coerces a raw argument list for this operation.
    ///
    /// # Errors
    ///
    /// See [`Arguments::coerce`].
    pub fn coerce(&self, raw: &[String]) -> Result<Arguments, CoercionError> {
        Arguments::coerce(self.arguments, raw)
    }

    /// Runs the executor against `engine`.
    ///
    /// # Errors
    ///
    /// Propagates argument access and engine failures.
    pub fn execute(
        &self,
        engine: &dyn NotationEngine,
        arguments: &Arguments,
    ) -> Result<Alteration, EditFailure> {
        (self.executor)(engine, arguments)
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Lookup table over a static descriptor set.
#[derive(Debug, Clone, Copy)]
pub struct OperationRegistry {
    descriptors: &'static [OperationDescriptor],
}

impl OperationRegistry {
    /// Wraps a static descriptor set.
    #[must_use]
    pub const fn new(descriptors: &'static [OperationDescriptor]) -> Self {
        Self { descriptors }
    }

    /// Registry holding every supported edit operation.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Finds the descriptor registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&'static OperationDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
    }

    /// Registered descriptors in table order.
    #[must_use]
    pub fn descriptors(&self) -> &'static [OperationDescriptor] {
        self.descriptors
    }
}

use ArgKind::{Float, Int, Text};

static STANDARD: OperationRegistry = OperationRegistry::new(&DESCRIPTORS);

static DESCRIPTORS: [OperationDescriptor; 16] = [
    OperationDescriptor {
        name: "changeKeySignature",
        arguments: &[Float, Int, Int],
        executor: change_key_signature,
    },
    OperationDescriptor {
        name: "changeTimeSignature",
        arguments: &[Float, Int, Text],
        executor: change_time_signature,
    },
    OperationDescriptor {
        name: "insertNote",
        arguments: &[Float, Int, Text, Float],
        executor: insert_note,
    },
    OperationDescriptor {
        name: "removeNote",
        arguments: &[Float, Int, Text],
        executor: remove_note,
    },
    OperationDescriptor {
        name: "insertMetronomeMark",
        arguments: &[Float, Int, Text, Int, Float],
        executor: insert_metronome_mark,
    },
    OperationDescriptor {
        name: "removeMetronomeMark",
        arguments: &[Float, Int],
        executor: remove_metronome_mark,
    },
    OperationDescriptor {
        name: "transpose",
        arguments: &[Int, Int],
        executor: transpose,
    },
    OperationDescriptor {
        name: "insertClef",
        arguments: &[Float, Int, Text],
        executor: insert_clef,
    },
    OperationDescriptor {
        name: "removeClef",
        arguments: &[Float, Int],
        executor: remove_clef,
    },
    OperationDescriptor {
        name: "insertMeasures",
        arguments: &[Float, Int, Float],
        executor: insert_measures,
    },
    OperationDescriptor {
        name: "removeMeasures",
        arguments: &[Float, Int, Float],
        executor: remove_measures,
    },
    OperationDescriptor {
        name: "addInstrument",
        arguments: &[Float, Int, Text],
        executor: add_instrument,
    },
    OperationDescriptor {
        name: "removeInstrument",
        arguments: &[Float, Int],
        executor: remove_instrument,
    },
    OperationDescriptor {
        name: "addDynamic",
        arguments: &[Float, Int, Text],
        executor: add_dynamic,
    },
    OperationDescriptor {
        name: "removeDynamic",
        arguments: &[Float, Int],
        executor: remove_dynamic,
    },
    OperationDescriptor {
        name: "addLyric",
        arguments: &[Float, Int, Text],
        executor: add_lyric,
    },
];

fn change_key_signature(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.change_key_signature(args.float(0)?, args.part(1)?, args.int(2)?)?)
}

fn change_time_signature(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.change_time_signature(args.float(0)?, args.part(1)?, args.text(2)?)?)
}

fn insert_note(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.insert_note(
        args.float(0)?,
        args.part(1)?,
        args.text(2)?,
        args.float(3)?,
    )?)
}

fn remove_note(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_note(args.float(0)?, args.part(1)?, args.text(2)?)?)
}

fn insert_metronome_mark(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.insert_metronome_mark(
        args.float(0)?,
        args.part(1)?,
        args.text(2)?,
        args.int(3)?,
        args.float(4)?,
    )?)
}

fn remove_metronome_mark(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_metronome_mark(args.float(0)?, args.part(1)?)?)
}

fn transpose(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.transpose(args.part(0)?, args.int(1)?)?)
}

fn insert_clef(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.insert_clef(args.float(0)?, args.part(1)?, args.text(2)?)?)
}

fn remove_clef(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_clef(args.float(0)?, args.part(1)?)?)
}

fn insert_measures(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.insert_measures(args.float(0)?, args.part(1)?, args.float(2)?)?)
}

fn remove_measures(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_measures(args.float(0)?, args.part(1)?, args.float(2)?)?)
}

fn add_instrument(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.add_instrument(args.float(0)?, args.part(1)?, args.text(2)?)?)
}

fn remove_instrument(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_instrument(args.float(0)?, args.part(1)?)?)
}

fn add_dynamic(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.add_dynamic(args.float(0)?, args.part(1)?, args.text(2)?)?)
}

fn remove_dynamic(
    engine: &dyn NotationEngine,
    args: &Arguments,
) -> Result<Alteration, EditFailure> {
    Ok(engine.remove_dynamic(args.float(0)?, args.part(1)?)?)
}

fn add_lyric(engine: &dyn NotationEngine, args: &Arguments) -> Result<Alteration, EditFailure> {
    Ok(engine.add_lyric(args.float(0)?, args.part(1)?, args.text(2)?)?)
}
