use std::fmt;

use serde::Serialize;

/// Lifecycle of one worker instance.
///
/// `Uninstalled -> Installing -> Installed -> Activating -> Active`, with
/// `Redundant` reachable from any live state when install fails or a newer
/// worker takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninstalled,
    Installing,
    /// Installed and waiting for promotion
    Installed,
    Activating,
    Active,
    Redundant,
}

impl WorkerState {
    pub fn can_transition(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Uninstalled, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
                // Restart of an already-populated worker
                | (Uninstalled, Active)
                | (Uninstalled | Installing | Installed | Activating | Active, Redundant)
        )
    }

    pub fn is_active(self) -> bool {
        self == WorkerState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::WorkerState::*;

    #[test]
    fn test_forward_path() {
        let path = [Uninstalled, Installing, Installed, Activating, Active];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Installing.can_transition(Active));
        assert!(!Installed.can_transition(Active));
        assert!(!Active.can_transition(Installing));
        assert!(!Redundant.can_transition(Active));
        assert!(!Redundant.can_transition(Redundant));
    }

    #[test]
    fn test_any_live_state_can_become_redundant() {
        for state in [Uninstalled, Installing, Installed, Activating, Active] {
            assert!(state.can_transition(Redundant));
        }
    }
}
