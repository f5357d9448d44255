use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId};
use event_bus::EventEnvelope;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ContractError;

/// A versioned integration event.
///
/// `SCHEMA_VERSION` must be bumped whenever a field changes meaning or is
/// removed. Adding an optional field is not a breaking change.
pub trait Contract: Serialize + DeserializeOwned {
    /// Event type the bus routes on.
    const EVENT_TYPE: &'static str;

    /// Current schema version of the payload.
    const SCHEMA_VERSION: u16;

    /// When the fact happened.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Wraps the contract in an envelope stamped with its type and version.
    fn to_envelope(&self) -> Result<EventEnvelope, ContractError> {
        let envelope = EventEnvelope::builder()
            .event_type(Self::EVENT_TYPE)
            .schema_version(Self::SCHEMA_VERSION)
            .occurred_at(self.timestamp())
            .payload(self)?
            .build()?;
        Ok(envelope)
    }

    /// Decodes a contract from an envelope.
    ///
    /// Fails if the envelope holds another event type or was written with a
    /// schema version newer than [`Self::SCHEMA_VERSION`].
    fn from_envelope(envelope: &EventEnvelope) -> Result<Self, ContractError> {
        if envelope.event_type != Self::EVENT_TYPE {
            return Err(ContractError::WrongEventType {
                expected: Self::EVENT_TYPE,
                actual: envelope.event_type.clone(),
            });
        }
        if envelope.schema_version > Self::SCHEMA_VERSION {
            return Err(ContractError::UnsupportedVersion {
                event_type: envelope.event_type.clone(),
                version: envelope.schema_version,
                supported: Self::SCHEMA_VERSION,
            });
        }

        serde_json::from_value(envelope.payload.clone()).map_err(|source| {
            ContractError::InvalidPayload {
                event_type: envelope.event_type.clone(),
                source,
            }
        })
    }
}

/// A harvest was registered. Consumed by inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestCreated {
    pub harvest_id: HarvestId,
    pub product: String,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Contract for HarvestCreated {
    const EVENT_TYPE: &'static str = "HarvestCreated";
    const SCHEMA_VERSION: u16 = 1;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A harvest entered processing. Consumed by billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestInProcess {
    pub harvest_id: HarvestId,
    pub farmer_id: FarmerId,
    pub farmer_name: String,
    pub product: String,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Contract for HarvestInProcess {
    const EVENT_TYPE: &'static str = "HarvestInProcess";
    const SCHEMA_VERSION: u16 = 1;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// An invoice was issued for a harvest. Consumed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCreated {
    pub invoice_id: InvoiceId,
    pub harvest_id: HarvestId,
    pub farmer_id: FarmerId,
    pub total: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Contract for InvoiceCreated {
    const EVENT_TYPE: &'static str = "InvoiceCreated";
    const SCHEMA_VERSION: u16 = 1;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Any integration event known to this build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IntegrationEvent {
    HarvestCreated(HarvestCreated),
    HarvestInProcess(HarvestInProcess),
    InvoiceCreated(InvoiceCreated),
}

impl IntegrationEvent {
    /// Returns the event type string.
    pub fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::HarvestCreated(_) => HarvestCreated::EVENT_TYPE,
            IntegrationEvent::HarvestInProcess(_) => HarvestInProcess::EVENT_TYPE,
            IntegrationEvent::InvoiceCreated(_) => InvoiceCreated::EVENT_TYPE,
        }
    }

    /// Wraps the event in an envelope.
    pub fn to_envelope(&self) -> Result<EventEnvelope, ContractError> {
        match self {
            IntegrationEvent::HarvestCreated(e) => e.to_envelope(),
            IntegrationEvent::HarvestInProcess(e) => e.to_envelope(),
            IntegrationEvent::InvoiceCreated(e) => e.to_envelope(),
        }
    }

    /// Decodes whichever contract the envelope carries.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, ContractError> {
        match envelope.event_type.as_str() {
            HarvestCreated::EVENT_TYPE => {
                HarvestCreated::from_envelope(envelope).map(IntegrationEvent::HarvestCreated)
            }
            HarvestInProcess::EVENT_TYPE => {
                HarvestInProcess::from_envelope(envelope).map(IntegrationEvent::HarvestInProcess)
            }
            InvoiceCreated::EVENT_TYPE => {
                InvoiceCreated::from_envelope(envelope).map(IntegrationEvent::InvoiceCreated)
            }
            other => Err(ContractError::UnknownEventType(other.to_string())),
        }
    }
}

impl From<HarvestCreated> for IntegrationEvent {
    fn from(event: HarvestCreated) -> Self {
        IntegrationEvent::HarvestCreated(event)
    }
}

impl From<HarvestInProcess> for IntegrationEvent {
    fn from(event: HarvestInProcess) -> Self {
        IntegrationEvent::HarvestInProcess(event)
    }
}

impl From<InvoiceCreated> for IntegrationEvent {
    fn from(event: InvoiceCreated) -> Self {
        IntegrationEvent::InvoiceCreated(event)
    }
}
