use crate::core::config::EngineConfig;
use crate::core::window::Window;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// fold into the window as usual
    Admit,
    /// past the window's lateness but inside the dead-letter window, routed to the side channel
    LateButAllowed,
    /// counted and discarded
    Dropped,
}

impl std::fmt::Display for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Admission::Admit => write!(f, "admit"),
            Admission::LateButAllowed => write!(f, "late_but_allowed"),
            Admission::Dropped => write!(f, "dropped"),
        }
    }
}

/// Decides what happens to an event assigned to `window` given the partition's watermark.
#[derive(Clone, Copy, Debug)]
pub struct LateDataPolicy {
    allowed_lateness: u64,
    dead_letter_window: u64,
}

impl LateDataPolicy {
    pub fn new(allowed_lateness: u64, dead_letter_window: u64) -> Self {
        LateDataPolicy {
            allowed_lateness,
            dead_letter_window,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        LateDataPolicy::new(
            config.window().allowed_lateness_ms(),
            config.dead_letter_window_ms(),
        )
    }

    pub fn allowed_lateness(&self) -> u64 {
        self.allowed_lateness
    }

    pub fn dead_letter_window(&self) -> u64 {
        self.dead_letter_window
    }

    pub fn admit(&self, window: &Window, watermark: u64) -> Admission {
        let lateness_bound = window.end().saturating_add(self.allowed_lateness);
        if watermark < lateness_bound {
            Admission::Admit
        } else if watermark < lateness_bound.saturating_add(self.dead_letter_window) {
            Admission::LateButAllowed
        } else {
            Admission::Dropped
        }
    }

    /// Combine the per-window verdicts of one event: admitted by any window wins, then
    /// late-but-allowed, an event without windows is dropped.
    pub fn resolve<I>(verdicts: I) -> Admission
    where
        I: IntoIterator<Item = Admission>,
    {
        let mut resolved = Admission::Dropped;
        for verdict in verdicts {
            match verdict {
                Admission::Admit => return Admission::Admit,
                Admission::LateButAllowed => resolved = Admission::LateButAllowed,
                Admission::Dropped => {}
            }
        }
        resolved
    }
}
