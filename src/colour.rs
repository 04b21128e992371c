//! Maximally distinguishable user colours.
//!
//! Colours come from a binary subdivision of the RGB cube. Level 0 uses
//! the channel values {0, 255}; every further level halves the step between
//! channel values and yields only the colours that use at least one of the
//! newly introduced values. Early colours are therefore far apart, and no
//! colour repeats. Pure black and pure white are never produced.

use std::collections::HashMap;

use crate::types::Colour;

/// Deepest subdivision level; channel values then step by 2.
const MAX_LEVEL: u32 = 7;

/// Lazy, duplicate-free sequence of distinguishable colours.
#[derive(Debug, Clone, Default)]
pub struct ColourSequence {
    level: u32,
    cursor: u32,
}

impl ColourSequence {
    /// Start a new sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel value of step `k` at `level`.
    fn channel(k: u32, level: u32) -> u8 {
        (k << (8 - level)).min(255) as u8
    }
}

impl Iterator for ColourSequence {
    type Item = Colour;

    fn next(&mut self) -> Option<Colour> {
        while self.level <= MAX_LEVEL {
            let side = (1u32 << self.level) + 1;
            if self.cursor >= side * side * side {
                self.level += 1;
                self.cursor = 0;
                continue;
            }

            let (r, g, b) = (self.cursor / (side * side), self.cursor / side % side, self.cursor % side);
            self.cursor += 1;

            // colours with only even steps were produced by an earlier level
            if self.level > 0 && r % 2 == 0 && g % 2 == 0 && b % 2 == 0 {
                continue;
            }
            let colour = Colour::rgb(
                Self::channel(r, self.level),
                Self::channel(g, self.level),
                Self::channel(b, self.level),
            );
            if colour.0 == [0, 0, 0] || colour.0 == [255, 255, 255] {
                continue;
            }
            return Some(colour);
        }
        None
    }
}

/// Hands out one colour per user, in order of first request.
#[derive(Debug, Clone, Default)]
pub struct ColourAssigner {
    sequence: ColourSequence,
    assigned: HashMap<String, Colour>,
}

impl ColourAssigner {
    /// Create an assigner with a fresh sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's colour, taking the next one from the sequence on first use.
    ///
    /// Restarts the sequence if it is ever exhausted.
    pub fn colour_for(&mut self, user: &str) -> Colour {
        if let Some(colour) = self.assigned.get(user) {
            return *colour;
        }
        let colour = match self.sequence.next() {
            Some(colour) => colour,
            None => {
                self.sequence = ColourSequence::new();
                self.sequence.next().unwrap_or(Colour::rgb(255, 0, 0))
            }
        };
        self.assigned.insert(user.to_string(), colour);
        colour
    }

    /// Number of users with a colour.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Whether no colour has been assigned.
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
