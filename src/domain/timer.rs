use std::collections::BTreeSet;

use crate::core::time::format_countdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Warning {
    pub threshold: u64,
    pub message: &'static str,
    pub urgent: bool,
}

pub const WARNINGS: [Warning; 2] = [
    Warning { threshold: 300, message: "5 minutes remaining!", urgent: false },
    Warning { threshold: 60, message: "1 minute remaining!", urgent: true },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Expired,
    Stopped,
}

/// Countdown styling. Independent of the one-shot warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerLevel {
    Normal,
    Warn,
    Danger,
}

impl TimerLevel {
    pub fn for_remaining(remaining: u64) -> Self {
        if remaining <= 60 {
            Self::Danger
        } else if remaining <= 300 {
            Self::Warn
        } else {
            Self::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warn => "warn",
            Self::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub remaining: u64,
    pub warnings: Vec<Warning>,
    /// Set on the single tick that reaches zero.
    pub expired: bool,
}

/// Remaining exam time. Never increases and never goes below zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u64,
    fired: BTreeSet<u64>,
    state: TimerState,
}

impl Countdown {
    pub fn new(seconds: u64) -> Self {
        Self { remaining: seconds, fired: BTreeSet::new(), state: TimerState::Running }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn tick(&mut self) -> Tick {
        self.advance(1)
    }

    /// Moves the clock forward by `seconds`. Thresholds crossed on the way fire once each,
    /// even when several are skipped in one step.
    pub fn advance(&mut self, seconds: u64) -> Tick {
        if self.state != TimerState::Running {
            return Tick { remaining: self.remaining, warnings: Vec::new(), expired: false };
        }

        let previous = self.remaining;
        let current = previous.saturating_sub(seconds);
        self.remaining = current;

        let fired = &mut self.fired;
        let warnings = WARNINGS
            .iter()
            .filter(|warning| previous > warning.threshold && warning.threshold >= current)
            .filter(|warning| fired.insert(warning.threshold))
            .copied()
            .collect();

        let expired = current == 0;
        if expired {
            self.state = TimerState::Expired;
        }

        Tick { remaining: self.remaining, warnings, expired }
    }

    /// Freezes the clock. Used when submission begins.
    pub fn stop(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Stopped;
        }
    }

    pub fn level(&self) -> TimerLevel {
        TimerLevel::for_remaining(self.remaining)
    }

    pub fn display(&self) -> String {
        format_countdown(self.remaining)
    }
}
