use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier gets its own type so a `HarvestId` can never be passed
/// where an `InvoiceId` is expected, even though both wrap a UUID.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a harvest owned by the registry.
    HarvestId
);

uuid_id!(
    /// Identifier of a farmer owned by the registry.
    FarmerId
);

uuid_id!(
    /// Identifier of an invoice owned by billing.
    InvoiceId
);

uuid_id!(
    /// Identifier of a single invoice line.
    LineItemId
);

uuid_id!(
    /// Identifier of an inventory item (a stock row).
    ItemId
);

uuid_id!(
    /// Identifier of a published message.
    EventId
);

/// Coarse classification of a failure, shared by every service.
///
/// Request-path callers use it to choose a response; consumers ignore it
/// because every consumer failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input: non-positive quantity, unknown state name.
    Validation,
    /// The addressed aggregate does not exist.
    NotFound,
    /// The request collides with existing state.
    Conflict,
    /// Connectivity, timeout or any other storage failure.
    Storage,
}

impl ErrorKind {
    /// Returns true for failures that a retry may fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(HarvestId::new(), HarvestId::new());
        assert_ne!(InvoiceId::new(), InvoiceId::new());
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = FarmerId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let uuid = Uuid::new_v4();
        let id = HarvestId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn ids_parse_from_str() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ItemId>().is_err());
    }

    #[test]
    fn only_storage_errors_are_transient() {
        assert!(ErrorKind::Storage.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
        assert!(!ErrorKind::Conflict.is_transient());
    }
}
