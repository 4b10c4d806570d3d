//! Exam countdown state.
//!
//! The countdown only moves when it is ticked; whoever owns it decides how
//! often that happens.

/// Outcome of a single one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still running, with the given seconds left.
    Running(u32),
    /// This tick took the clock to zero.
    Expired,
    /// Already at zero; nothing changed.
    Idle,
}

/// Remaining time for an attempt, bounded by `0..=total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    total: u32,
}

impl Countdown {
    /// A full clock of `total` seconds.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            remaining: total,
            total,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Seconds used so far.
    #[must_use]
    pub fn elapsed(&self) -> u32 {
        self.total - self.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// Decrement by one second, floored at zero.
    pub fn tick(&mut self) -> Tick {
        match self.remaining {
            0 => Tick::Idle,
            1 => {
                self.remaining = 0;
                Tick::Expired
            }
            n => {
                self.remaining = n - 1;
                Tick::Running(self.remaining)
            }
        }
    }
}
