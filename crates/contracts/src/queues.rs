//! Queue names and their bindings.
//!
//! Each consuming service owns one queue. Publishers never name a queue;
//! the bus routes on event type.

use crate::{Contract, HarvestCreated, HarvestInProcess, InvoiceCreated};

/// Inventory's queue, fed by [`HarvestCreated`].
pub const INVENTORY_HARVEST_CREATED: &str = "inventory.harvest-created";

/// Billing's queue, fed by [`HarvestInProcess`].
pub const BILLING_HARVEST_IN_PROCESS: &str = "billing.harvest-in-process";

/// Registry's queue, fed by [`InvoiceCreated`].
pub const REGISTRY_INVOICE_CREATED: &str = "registry.invoice-created";

/// Every queue with the event types bound to it.
pub const BINDINGS: &[(&str, &[&str])] = &[
    (INVENTORY_HARVEST_CREATED, &[HarvestCreated::EVENT_TYPE]),
    (BILLING_HARVEST_IN_PROCESS, &[HarvestInProcess::EVENT_TYPE]),
    (REGISTRY_INVOICE_CREATED, &[InvoiceCreated::EVENT_TYPE]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_queue_is_bound_once() {
        let mut names: Vec<&str> = BINDINGS.iter().map(|(q, _)| *q).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BINDINGS.len());
    }
}
