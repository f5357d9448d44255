use chrono::{DateTime, Utc};
use common::FarmerId;
use serde::{Deserialize, Serialize};

use crate::{RegistryError, Result};

/// A farmer who delivers harvests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: FarmerId,
    pub name: String,
    pub farm: String,
    pub location: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

impl Farmer {
    /// Creates a farmer from validated details.
    pub fn new(details: FarmerDetails) -> Result<Self> {
        let details = details.validated()?;
        Ok(Self {
            id: FarmerId::new(),
            name: details.name,
            farm: details.farm,
            location: details.location,
            email: details.email,
            registered_at: Utc::now(),
        })
    }

    /// Replaces the editable fields.
    pub fn apply(&mut self, details: FarmerDetails) -> Result<()> {
        let details = details.validated()?;
        self.name = details.name;
        self.farm = details.farm;
        self.location = details.location;
        self.email = details.email;
        Ok(())
    }
}

/// Editable farmer fields, used for both create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmerDetails {
    pub name: String,
    pub farm: String,
    pub location: String,
    pub email: String,
}

impl FarmerDetails {
    /// Trims every field and checks presence, length and email shape.
    fn validated(self) -> Result<Self> {
        let name = required("name", &self.name, 100)?;
        let farm = required("farm", &self.farm, 100)?;
        let location = required("location", &self.location, 100)?;
        let email = required("email", &self.email, 150)?;

        let valid_email = email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(RegistryError::InvalidField {
                field: "email",
                reason: "must be an email address",
            });
        }

        Ok(Self {
            name,
            farm,
            location,
            email,
        })
    }
}

/// Trims `value` and rejects it when blank or longer than `max_len` chars.
pub(crate) fn required(field: &'static str, value: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistryError::InvalidField {
            field,
            reason: "is required",
        });
    }
    if value.chars().count() > max_len {
        return Err(RegistryError::InvalidField {
            field,
            reason: "is too long",
        });
    }
    Ok(value.to_string())
}
