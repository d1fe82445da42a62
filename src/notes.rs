//! Note table: the two octaves the keyboard and sequencer can address.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Note name placed on a step when it is toggled on.
pub const DEFAULT_STEP_NOTE: &str = "C";

/// Note names and their frequencies in Hz, lowest first.
///
/// The lower octave uses bare names (`"C"`, `"C#"`), the upper octave
/// carries a `2` suffix (`"C2"`, `"C#2"`).
pub const NOTE_FREQUENCIES: [(&str, f64); 24] = [
    ("C", 261.63),
    ("C#", 277.18),
    ("D", 293.66),
    ("D#", 311.13),
    ("E", 329.63),
    ("F", 349.23),
    ("F#", 369.99),
    ("G", 392.00),
    ("G#", 415.30),
    ("A", 440.00),
    ("A#", 466.16),
    ("B", 493.88),
    ("C2", 523.25),
    ("C#2", 554.37),
    ("D2", 587.33),
    ("D#2", 622.25),
    ("E2", 659.25),
    ("F2", 698.46),
    ("F#2", 739.99),
    ("G2", 783.99),
    ("G#2", 830.61),
    ("A2", 880.00),
    ("A#2", 932.33),
    ("B2", 987.77),
];

/// A note from [`NOTE_FREQUENCIES`], stored as its table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note(u8);

impl Note {
    /// Look up a note by name. Empty or unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Note> {
        NOTE_FREQUENCIES
            .iter()
            .position(|(n, _)| *n == name)
            .map(|idx| Note(idx as u8))
    }

    /// The note placed on a freshly toggled step.
    pub fn default_step() -> Note {
        Note(0)
    }

    /// Iterate over every note in the table, lowest first.
    pub fn all() -> impl Iterator<Item = Note> {
        (0..NOTE_FREQUENCIES.len() as u8).map(Note)
    }

    pub fn name(self) -> &'static str {
        NOTE_FREQUENCIES[self.0 as usize].0
    }

    /// Frequency in Hz.
    pub fn frequency(self) -> f64 {
        NOTE_FREQUENCIES[self.0 as usize].1
    }
}

/// Resolve a note name straight to its frequency.
pub fn note_to_frequency(name: &str) -> Option<f64> {
    Note::parse(name).map(Note::frequency)
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Note {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Note {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Note::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown note '{name}'")))
    }
}
