//! Invoice lifecycle.

use serde::{Deserialize, Serialize};

use crate::BillingError;

/// The state of an invoice.
///
/// ```text
/// Pending ──► Paid ──► Voided
///    └──────────────────▲
/// ```
/// `Voided` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    /// Issued and awaiting payment; the only deletable state.
    #[default]
    Pending,

    Paid,

    Voided,
}

impl InvoiceState {
    pub const ALL: [InvoiceState; 3] = [
        InvoiceState::Pending,
        InvoiceState::Paid,
        InvoiceState::Voided,
    ];

    /// Returns true if an invoice may move from `self` to `next`.
    pub fn can_transition_to(&self, next: InvoiceState) -> bool {
        matches!(
            (self, next),
            (InvoiceState::Pending, InvoiceState::Paid)
                | (InvoiceState::Pending, InvoiceState::Voided)
                | (InvoiceState::Paid, InvoiceState::Voided)
        )
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, InvoiceState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceState::Voided)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Pending => "PENDING",
            InvoiceState::Paid => "PAID",
            InvoiceState::Voided => "VOIDED",
        }
    }
}

impl std::fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceState {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(InvoiceState::Pending),
            "PAID" => Ok(InvoiceState::Paid),
            "VOIDED" => Ok(InvoiceState::Voided),
            _ => Err(BillingError::InvalidState(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_transitions() {
        use InvoiceState::*;

        let allowed: Vec<(InvoiceState, InvoiceState)> = InvoiceState::ALL
            .iter()
            .flat_map(|&from| InvoiceState::ALL.iter().map(move |&to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(allowed, vec![(Pending, Paid), (Pending, Voided), (Paid, Voided)]);
    }

    #[test]
    fn voided_is_terminal() {
        assert!(InvoiceState::Voided.is_terminal());
        assert!(
            InvoiceState::ALL
                .iter()
                .all(|&to| !InvoiceState::Voided.can_transition_to(to))
        );
    }

    #[test]
    fn parses_ignoring_case() {
        assert_eq!("paid".parse::<InvoiceState>().unwrap(), InvoiceState::Paid);
        assert_eq!(" Voided ".parse::<InvoiceState>().unwrap(), InvoiceState::Voided);
        assert!(matches!(
            "ANULADA".parse::<InvoiceState>(),
            Err(BillingError::InvalidState(_))
        ));
    }

    #[test]
    fn only_pending_is_deletable() {
        assert!(InvoiceState::Pending.can_delete());
        assert!(!InvoiceState::Paid.can_delete());
        assert!(!InvoiceState::Voided.can_delete());
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&InvoiceState::Pending).unwrap(),
            "\"PENDING\""
        );
    }
}
