//! Harvest state machine.

use serde::{Deserialize, Serialize};

use crate::RegistryError;

/// The state of a harvest in its lifecycle.
///
/// State transitions with [`TransitionTable::LINEAR`]:
/// ```text
/// Registered ──► InProcess ──► Invoiced ──► Completed
/// ```
/// [`TransitionTable::ROTATING`] adds `Completed ──► Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestState {
    /// Freshly recorded; the only state in which a harvest can be deleted.
    #[default]
    Registered,

    /// Being processed; entering this state triggers invoicing.
    InProcess,

    /// An invoice was issued.
    Invoiced,

    /// Done.
    Completed,
}

impl HarvestState {
    /// Every state, in lifecycle order.
    pub const ALL: [HarvestState; 4] = [
        HarvestState::Registered,
        HarvestState::InProcess,
        HarvestState::Invoiced,
        HarvestState::Completed,
    ];

    /// Returns true if a harvest in this state can be deleted.
    pub fn can_delete(&self) -> bool {
        matches!(self, HarvestState::Registered)
    }

    /// Returns the state name as stored and shown to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestState::Registered => "REGISTERED",
            HarvestState::InProcess => "IN_PROCESS",
            HarvestState::Invoiced => "INVOICED",
            HarvestState::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for HarvestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HarvestState {
    type Err = RegistryError;

    /// Parses a state name case-insensitively, ignoring `_`, `-` and spaces,
    /// so `"in process"`, `"In-Process"` and `"IN_PROCESS"` are equivalent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_uppercase)
            .collect();

        match normalized.as_str() {
            "REGISTERED" => Ok(HarvestState::Registered),
            "INPROCESS" => Ok(HarvestState::InProcess),
            "INVOICED" => Ok(HarvestState::Invoiced),
            "COMPLETED" => Ok(HarvestState::Completed),
            _ => Err(RegistryError::InvalidState(s.to_string())),
        }
    }
}

/// Allowed state changes, as a list of `(from, to)` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    edges: &'static [(HarvestState, HarvestState)],
}

impl TransitionTable {
    /// Forward-only lifecycle; `Completed` is terminal.
    pub const LINEAR: TransitionTable = TransitionTable {
        edges: &[
            (HarvestState::Registered, HarvestState::InProcess),
            (HarvestState::InProcess, HarvestState::Invoiced),
            (HarvestState::Invoiced, HarvestState::Completed),
        ],
    };

    /// Forward lifecycle that wraps `Completed` back to `Registered`.
    pub const ROTATING: TransitionTable = TransitionTable {
        edges: &[
            (HarvestState::Registered, HarvestState::InProcess),
            (HarvestState::InProcess, HarvestState::Invoiced),
            (HarvestState::Invoiced, HarvestState::Completed),
            (HarvestState::Completed, HarvestState::Registered),
        ],
    };

    /// Creates a table from explicit edges.
    pub const fn new(edges: &'static [(HarvestState, HarvestState)]) -> Self {
        Self { edges }
    }

    /// Returns true if `from → to` is an edge of the table.
    pub fn allows(&self, from: HarvestState, to: HarvestState) -> bool {
        self.edges.iter().any(|&(f, t)| f == from && t == to)
    }

    /// Returns the state `advance` moves to from `from`.
    pub fn successor(&self, from: HarvestState) -> Option<HarvestState> {
        self.edges
            .iter()
            .find(|(f, _)| *f == from)
            .map(|&(_, to)| to)
    }

    /// Returns true if no edge leaves `state`.
    pub fn is_terminal(&self, state: HarvestState) -> bool {
        self.successor(state).is_none()
    }

    /// Validates `from → to`.
    pub fn check(&self, from: HarvestState, to: HarvestState) -> Result<(), RegistryError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(RegistryError::InvalidTransition { from, to })
        }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::LINEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_registered() {
        assert_eq!(HarvestState::default(), HarvestState::Registered);
    }

    #[test]
    fn test_only_registered_can_be_deleted() {
        assert!(HarvestState::Registered.can_delete());
        assert!(!HarvestState::InProcess.can_delete());
        assert!(!HarvestState::Invoiced.can_delete());
        assert!(!HarvestState::Completed.can_delete());
    }

    #[test]
    fn test_parse_is_case_and_separator_insensitive() {
        for input in ["IN_PROCESS", "in_process", "In-Process", "in process", "inprocess"] {
            assert_eq!(
                input.parse::<HarvestState>().unwrap(),
                HarvestState::InProcess,
                "{input}"
            );
        }
        assert_eq!(
            "completed".parse::<HarvestState>().unwrap(),
            HarvestState::Completed
        );
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        assert!(matches!(
            "SHIPPED".parse::<HarvestState>(),
            Err(RegistryError::InvalidState(s)) if s == "SHIPPED"
        ));
        assert!("".parse::<HarvestState>().is_err());
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for state in HarvestState::ALL {
            assert_eq!(state.as_str().parse::<HarvestState>().unwrap(), state);
        }
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&HarvestState::InProcess).unwrap(),
            "\"IN_PROCESS\""
        );
    }

    #[test]
    fn test_linear_table_is_forward_only() {
        let table = TransitionTable::LINEAR;
        assert!(table.allows(HarvestState::Registered, HarvestState::InProcess));
        assert!(table.allows(HarvestState::InProcess, HarvestState::Invoiced));
        assert!(table.allows(HarvestState::Invoiced, HarvestState::Completed));

        assert!(!table.allows(HarvestState::Registered, HarvestState::Invoiced));
        assert!(!table.allows(HarvestState::InProcess, HarvestState::Registered));
        assert!(!table.allows(HarvestState::Completed, HarvestState::Registered));
        assert!(table.is_terminal(HarvestState::Completed));
    }

    #[test]
    fn test_rotating_table_wraps_around() {
        let table = TransitionTable::ROTATING;
        assert_eq!(
            table.successor(HarvestState::Completed),
            Some(HarvestState::Registered)
        );
        assert!(!table.is_terminal(HarvestState::Completed));
    }

    #[test]
    fn test_successor_follows_lifecycle_order() {
        let table = TransitionTable::default();
        assert_eq!(
            table.successor(HarvestState::Registered),
            Some(HarvestState::InProcess)
        );
        assert_eq!(
            table.successor(HarvestState::InProcess),
            Some(HarvestState::Invoiced)
        );
        assert_eq!(
            table.successor(HarvestState::Invoiced),
            Some(HarvestState::Completed)
        );
        assert_eq!(table.successor(HarvestState::Completed), None);
    }

    #[test]
    fn test_check_reports_the_rejected_edge() {
        let err = TransitionTable::LINEAR
            .check(HarvestState::Invoiced, HarvestState::InProcess)
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidTransition {
                from: HarvestState::Invoiced,
                to: HarvestState::InProcess
            }
        ));
    }
}
