// src/deadline.rs

//! Re-derivable time budget shared by every suspension point of one task.
//!
//! A relevant [`Deadline`] is never decremented in place. Each call to
//! [`Deadline::checked`] measures the wall clock again and hands back a fresh
//! value whose `remaining` is what is actually left, so the same budget can be
//! threaded through `init`, process launch and the exit-code wait.

use std::time::{Duration, Instant};

use crate::errors::{PackrunError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Irrelevant,
    Relevant { since: Instant, budget: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    budget: Budget,
}

impl Deadline {
    /// A deadline that never expires.
    pub const fn irrelevant() -> Self {
        Self {
            budget: Budget::Irrelevant,
        }
    }

    /// Start a clock now with the given budget.
    pub fn relevant(budget: Duration) -> Self {
        Self {
            budget: Budget::Relevant {
                since: Instant::now(),
                budget,
            },
        }
    }

    pub fn is_relevant(&self) -> bool {
        matches!(self.budget, Budget::Relevant { .. })
    }

    /// Budget this value was derived with. Always zero when irrelevant.
    pub fn remaining(&self) -> Duration {
        match self.budget {
            Budget::Irrelevant => Duration::ZERO,
            Budget::Relevant { budget, .. } => budget,
        }
    }

    /// Re-derive against the current instant.
    ///
    /// Fails with [`PackrunError::TimedOut`] once nothing is left.
    pub fn checked(&self) -> Result<Deadline> {
        match self.budget {
            Budget::Irrelevant => Ok(*self),
            Budget::Relevant { since, budget } => {
                let now = Instant::now();
                let left = budget.saturating_sub(now.saturating_duration_since(since));
                if left.is_zero() {
                    return Err(PackrunError::TimedOut);
                }
                Ok(Self {
                    budget: Budget::Relevant {
                        since: now,
                        budget: left,
                    },
                })
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::irrelevant()
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map(Deadline::relevant).unwrap_or_default()
    }
}
