use std::time::Duration;

/// Bounded count of soft faults a session tolerates. Only ever goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: i64,
}

impl RetryBudget {
    pub fn new(budget: u32) -> Self {
        Self {
            remaining: i64::from(budget),
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Spend one retry. Returns `true` when this spent the last one.
    pub fn consume(&mut self) -> bool {
        self.remaining -= 1;
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }
}

/// Pump timeout: a busy poll until the first soft fault, the backoff value
/// from then on. The switch happens at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    current: Duration,
    backoff: Duration,
}

impl PollTimeout {
    pub fn new(backoff: Duration) -> Self {
        Self {
            current: Duration::ZERO,
            backoff,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn is_backed_off(&self) -> bool {
        self.current == self.backoff
    }

    /// Raise to the backoff value. Returns `true` only on the first call.
    pub fn back_off(&mut self) -> bool {
        if self.is_backed_off() {
            return false;
        }
        self.current = self.backoff;
        true
    }
}
