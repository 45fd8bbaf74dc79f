//! Edit command envelope.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// A single edit request as it appears on the wire.
///
/// Arguments travel as strings; the server coerces them according to the
/// operation's registered argument kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Identifier of the project the edit targets.
    pub project_id: String,
    /// Registered operation name, matched case-sensitively.
    pub operation: String,
    /// Raw positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Part addressed by the edit, if any.
    #[serde(default)]
    pub part_index: Option<i64>,
    /// Document-time offset addressed by the edit, if any.
    #[serde(default)]
    pub offset: Option<f64>,
}

impl Command {
    /// Builds a command with no arguments and no location.
    #[must_use]
    pub fn new(project_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            operation: operation.into(),
            args: Vec::new(),
            part_index: None,
            offset: None,
        }
    }

    /// Replaces the raw argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Addresses a single part.
    #[must_use]
    pub const fn with_part(mut self, part_index: i64) -> Self {
        self.part_index = Some(part_index);
        self
    }

    /// Addresses a document-time offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Parses a command from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Empty`] for blank input and
    /// [`ProtocolError::Malformed`] when the text does not match the schema.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Encodes the command as a single JSON line without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if serialisation fails, which can
    /// only happen for a non-finite offset.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_full_envelope() {
        let command = Command::parse(
            r#"{"project_id":"p1","operation":"insertNote","args":["0.0","0","C4","1.0"],"part_index":0,"offset":0.0}"#,
        )
        .expect("parse command");
        let expected = Command::new("p1", "insertNote")
            .with_args(["0.0", "0", "C4", "1.0"])
            .with_part(0)
            .with_offset(0.0);
        assert_eq!(command, expected);
    }

    #[test]
    fn optional_fields_default_to_absent() {
        let command =
            Command::parse(r#"{"project_id":"p1","operation":"transpose"}"#).expect("parse");
        assert!(command.args.is_empty());
        assert_eq!(command.part_index, None);
        assert_eq!(command.offset, None);
    }

    #[test]
    fn explicit_nulls_are_absent() {
        let command = Command::parse(
            r#"{"project_id":"p1","operation":"transpose","args":[],"part_index":null,"offset":null}"#,
        )
        .expect("parse");
        assert_eq!(command.part_index, None);
        assert_eq!(command.offset, None);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_input_is_empty(#[case] input: &str) {
        assert!(matches!(Command::parse(input), Err(ProtocolError::Empty)));
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"operation":"insertNote"}"#)]
    #[case(r#"{"project_id":"p1","operation":"x","args":[1,2]}"#)]
    fn rejects_schema_violations(#[case] input: &str) {
        assert!(matches!(
            Command::parse(input),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn json_form_reparses_to_the_same_command() {
        let command = Command::new("p1", "addLyric")
            .with_args(["2.5", "1", "la"])
            .with_part(1)
            .with_offset(2.5);
        let text = command.to_json().expect("encode");
        assert!(!text.contains('\n'));
        assert_eq!(Command::parse(&text).expect("reparse"), command);
    }
}
