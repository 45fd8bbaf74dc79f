//! Contract for the notation engine that performs musical edits.
//!
//! The server never interprets musical content itself. Each registered
//! operation forwards its typed arguments to one [`NotationEngine`] method and
//! receives the document-time range the edit touched.

use thiserror::Error;

/// Document-time range affected by a successful edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alteration {
    /// Inclusive start of the affected range.
    pub start: f64,
    /// End of the affected range; infinite when the edit runs to the end.
    pub end: f64,
}

impl Alteration {
    /// Builds a range from `start` to `end`.
    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Builds an empty range at a single point.
    #[must_use]
    pub const fn point(at: f64) -> Self {
        Self::new(at, at)
    }

    /// Builds a range from `start` to the end of the document.
    #[must_use]
    pub const fn unbounded_from(start: f64) -> Self {
        Self::new(start, f64::INFINITY)
    }

    /// Reports whether the range runs to the end of the document.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.end.is_infinite()
    }
}

/// Errors reported by a notation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An argument was well typed but meaningless for the edit.
    #[error("invalid argument for {operation}: {message}")]
    InvalidArgument {
        /// Operation that rejected the argument.
        operation: &'static str,
        /// Human readable explanation.
        message: String,
    },
    /// The engine refused to apply the edit.
    #[error("edit rejected: {message}")]
    Rejected {
        /// Human readable explanation.
        message: String,
    },
}

impl EngineError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            message: message.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Performs edits on a score and reports the affected range.
pub trait NotationEngine: Send + Sync {
    /// Sets the key signature to `sharps` (negative for flats).
    fn change_key_signature(
        &self,
        offset: f64,
        part: usize,
        sharps: i64,
    ) -> Result<Alteration, EngineError>;

    /// Sets the time signature, written as `numerator/denominator`.
    fn change_time_signature(
        &self,
        offset: f64,
        part: usize,
        signature: &str,
    ) -> Result<Alteration, EngineError>;

    /// Inserts a note of `duration` quarter lengths.
    fn insert_note(
        &self,
        offset: f64,
        part: usize,
        pitch: &str,
        duration: f64,
    ) -> Result<Alteration, EngineError>;

    /// Removes the note with `pitch` sounding at `offset`.
    fn remove_note(&self, offset: f64, part: usize, pitch: &str)
    -> Result<Alteration, EngineError>;

    /// Inserts a tempo marking.
    fn insert_metronome_mark(
        &self,
        offset: f64,
        part: usize,
        text: &str,
        pulses_per_minute: i64,
        pulse_duration: f64,
    ) -> Result<Alteration, EngineError>;

    /// Removes the tempo marking at `offset`.
    fn remove_metronome_mark(&self, offset: f64, part: usize) -> Result<Alteration, EngineError>;

    /// Transposes a whole part by `semitones`.
    fn transpose(&self, part: usize, semitones: i64) -> Result<Alteration, EngineError>;

    /// Inserts a clef.
    fn insert_clef(&self, offset: f64, part: usize, clef: &str) -> Result<Alteration, EngineError>;

    /// Removes the clef at `offset`.
    fn remove_clef(&self, offset: f64, part: usize) -> Result<Alteration, EngineError>;

    /// Inserts `count` measures.
    fn insert_measures(
        &self,
        offset: f64,
        part: usize,
        count: f64,
    ) -> Result<Alteration, EngineError>;

    /// Removes the measures between `start` and `end`.
    fn remove_measures(&self, start: f64, part: usize, end: f64)
    -> Result<Alteration, EngineError>;

    /// Assigns an instrument from `offset` onwards.
    fn add_instrument(
        &self,
        offset: f64,
        part: usize,
        instrument: &str,
    ) -> Result<Alteration, EngineError>;

    /// Removes the instrument change at `offset`.
    fn remove_instrument(&self, offset: f64, part: usize) -> Result<Alteration, EngineError>;

    /// Adds a dynamic marking such as `mf`.
    fn add_dynamic(
        &self,
        offset: f64,
        part: usize,
        dynamic: &str,
    ) -> Result<Alteration, EngineError>;

    /// Removes the dynamic marking at `offset`.
    fn remove_dynamic(&self, offset: f64, part: usize) -> Result<Alteration, EngineError>;

    /// Attaches a lyric syllable.
    fn add_lyric(&self, offset: f64, part: usize, lyric: &str) -> Result<Alteration, EngineError>;
}

/// Engine that performs no musical work and reports the range an edit would
/// touch.
///
/// Extent arguments (note duration, measure count, removal end) widen the
/// range; every other edit reports a point. Transposition touches the whole
/// part.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeEngine;

impl RangeEngine {
    /// Builds the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn span(operation: &'static str, offset: f64, extent: f64) -> Result<Alteration, EngineError> {
    if !extent.is_finite() || extent < 0.0 {
        return Err(EngineError::invalid_argument(
            operation,
            format!("extent {extent} must be a non-negative number"),
        ));
    }
    Ok(Alteration::new(offset, offset + extent))
}

fn require_text(operation: &'static str, name: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid_argument(
            operation,
            format!("{name} must not be empty"),
        ));
    }
    Ok(())
}

impl NotationEngine for RangeEngine {
    fn change_key_signature(
        &self,
        offset: f64,
        _part: usize,
        sharps: i64,
    ) -> Result<Alteration, EngineError> {
        if !(-7..=7).contains(&sharps) {
            return Err(EngineError::invalid_argument(
                "changeKeySignature",
                format!("{sharps} accidentals is outside -7..=7"),
            ));
        }
        Ok(Alteration::point(offset))
    }

    fn change_time_signature(
        &self,
        offset: f64,
        _part: usize,
        signature: &str,
    ) -> Result<Alteration, EngineError> {
        let valid = signature
            .split_once('/')
            .is_some_and(|(numerator, denominator)| {
                numerator.trim().parse::<u32>().is_ok_and(|n| n > 0)
                    && denominator.trim().parse::<u32>().is_ok_and(|d| d > 0)
            });
        if !valid {
            return Err(EngineError::invalid_argument(
                "changeTimeSignature",
                format!("'{signature}' is not a time signature"),
            ));
        }
        Ok(Alteration::point(offset))
    }

    fn insert_note(
        &self,
        offset: f64,
        _part: usize,
        pitch: &str,
        duration: f64,
    ) -> Result<Alteration, EngineError> {
        require_text("insertNote", "pitch", pitch)?;
        span("insertNote", offset, duration)
    }

    fn remove_note(
        &self,
        offset: f64,
        _part: usize,
        pitch: &str,
    ) -> Result<Alteration, EngineError> {
        require_text("removeNote", "pitch", pitch)?;
        Ok(Alteration::point(offset))
    }

    fn insert_metronome_mark(
        &self,
        offset: f64,
        _part: usize,
        _text: &str,
        pulses_per_minute: i64,
        pulse_duration: f64,
    ) -> Result<Alteration, EngineError> {
        if pulses_per_minute <= 0 || pulse_duration <= 0.0 {
            return Err(EngineError::invalid_argument(
                "insertMetronomeMark",
                "tempo must be positive",
            ));
        }
        Ok(Alteration::point(offset))
    }

    fn remove_metronome_mark(&self, offset: f64, _part: usize) -> Result<Alteration, EngineError> {
        Ok(Alteration::point(offset))
    }

    fn transpose(&self, _part: usize, _semitones: i64) -> Result<Alteration, EngineError> {
        Ok(Alteration::unbounded_from(0.0))
    }

    fn insert_clef(
        &self,
        offset: f64,
        _part: usize,
        clef: &str,
    ) -> Result<Alteration, EngineError> {
        require_text("insertClef", "clef", clef)?;
        Ok(Alteration::point(offset))
    }

    fn remove_clef(&self, offset: f64, _part: usize) -> Result<Alteration, EngineError> {
        Ok(Alteration::point(offset))
    }

    fn insert_measures(
        &self,
        offset: f64,
        _part: usize,
        count: f64,
    ) -> Result<Alteration, EngineError> {
        span("insertMeasures", offset, count)
    }

    fn remove_measures(
        &self,
        start: f64,
        _part: usize,
        end: f64,
    ) -> Result<Alteration, EngineError> {
        if !end.is_finite() || end < start {
            return Err(EngineError::invalid_argument(
                "removeMeasures",
                format!("end {end} precedes start {start}"),
            ));
        }
        Ok(Alteration::new(start, end))
    }

    fn add_instrument(
        &self,
        offset: f64,
        _part: usize,
        instrument: &str,
    ) -> Result<Alteration, EngineError> {
        require_text("addInstrument", "instrument", instrument)?;
        Ok(Alteration::point(offset))
    }

    fn remove_instrument(&self, offset: f64, _part: usize) -> Result<Alteration, EngineError> {
        Ok(Alteration::point(offset))
    }

    fn add_dynamic(
        &self,
        offset: f64,
        _part: usize,
        dynamic: &str,
    ) -> Result<Alteration, EngineError> {
        require_text("addDynamic", "dynamic", dynamic)?;
        Ok(Alteration::point(offset))
    }

    fn remove_dynamic(&self, offset: f64, _part: usize) -> Result<Alteration, EngineError> {
        Ok(Alteration::point(offset))
    }

    fn add_lyric(&self, offset: f64, _part: usize, lyric: &str) -> Result<Alteration, EngineError> {
        require_text("addLyric", "lyric", lyric)?;
        Ok(Alteration::point(offset))
    }
}
