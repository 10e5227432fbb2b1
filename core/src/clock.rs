//! Engine clock — owns "now" so temporal rules are testable.
//!
//! Production code runs on the system clock. Tests (and the demo runner)
//! pin a fixed instant and advance it explicitly, the only way to exercise
//! validity windows, cooldowns and claim expiry deterministically.

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

#[derive(Debug, Clone)]
pub struct Clock {
    source: Source,
}

#[derive(Debug, Clone)]
enum Source {
    System,
    Fixed(Cell<DateTime<Utc>>),
}

impl Clock {
    pub fn system() -> Self {
        Self {
            source: Source::System,
        }
    }

    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self {
            source: Source::Fixed(Cell::new(at)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match &self.source {
            Source::System => Utc::now(),
            Source::Fixed(cell) => cell.get(),
        }
    }

    /// Move a fixed clock forward. Panics on a system clock — callers must
    /// only advance clocks they pinned themselves.
    pub fn advance(&self, by: Duration) {
        match &self.source {
            Source::System => panic!("advance() called on system clock"),
            Source::Fixed(cell) => cell.set(cell.get() + by),
        }
    }

    /// Pin a fixed clock to an exact instant. Panics on a system clock.
    pub fn set(&self, to: DateTime<Utc>) {
        match &self.source {
            Source::System => panic!("set() called on system clock"),
            Source::Fixed(cell) => cell.set(to),
        }
    }
}
