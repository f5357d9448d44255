use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId, LineItemId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::price_in_range;
use crate::{BillingError, InvoiceComputation, InvoiceState, Result};

/// Unit of every line item.
pub const LINE_ITEM_UNIT: &str = "Ton";

/// An invoice for one harvest.
///
/// Money amounts are fixed when the invoice is issued and never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub harvest_id: HarvestId,
    pub farmer_id: FarmerId,
    pub farmer_name: String,
    pub product: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub state: InvoiceState,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub line_items: Vec<InvoiceLineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: LineItemId,
    pub invoice_id: InvoiceId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub unit: String,
}

/// Everything needed to issue an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub harvest_id: HarvestId,
    pub farmer_id: FarmerId,
    pub farmer_name: String,
    pub product: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Requested lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Target state, matched ignoring case.
    pub state: String,
    /// Payment time; defaults to now when moving to `PAID`.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Replaces the invoice notes when present.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Ledger summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingStats {
    pub total_invoices: usize,
    pub pending: usize,
    pub paid: usize,
    pub voided: usize,
    /// Sum of totals of paid invoices.
    pub total_paid: Decimal,
    /// Same, restricted to invoices paid in the current calendar month.
    pub paid_this_month: Decimal,
}

impl Invoice {
    /// Issues a `PENDING` invoice with a single line item.
    pub fn issue(request: NewInvoice) -> Result<Self> {
        if request.quantity <= Decimal::ZERO {
            return Err(BillingError::InvalidQuantity(request.quantity));
        }
        if !contracts::quantity_in_range(request.quantity) {
            return Err(BillingError::QuantityOutOfRange(request.quantity));
        }
        if request.unit_price <= Decimal::ZERO {
            return Err(BillingError::InvalidPrice(request.unit_price));
        }
        if !price_in_range(request.unit_price) {
            return Err(BillingError::PriceOutOfRange(request.unit_price));
        }
        let farmer_name = required("farmer_name", &request.farmer_name, 100)?;
        let product = required("product", &request.product, 50)?;
        let notes = validate_notes(request.notes)?;

        let amounts = InvoiceComputation::compute(request.quantity, request.unit_price)?;
        let id = InvoiceId::new();

        let line_item = InvoiceLineItem {
            id: LineItemId::new(),
            invoice_id: id,
            description: format!("Sale of {product}"),
            quantity: request.quantity,
            unit_price: request.unit_price,
            subtotal: amounts.subtotal,
            unit: LINE_ITEM_UNIT.to_string(),
        };

        Ok(Self {
            id,
            harvest_id: request.harvest_id,
            farmer_id: request.farmer_id,
            farmer_name,
            product,
            quantity: request.quantity,
            unit_price: request.unit_price,
            subtotal: amounts.subtotal,
            tax_rate: amounts.tax_rate,
            tax_amount: amounts.tax_amount,
            total: amounts.total,
            state: InvoiceState::Pending,
            created_at: Utc::now(),
            paid_at: None,
            notes,
            line_items: vec![line_item],
        })
    }

    /// Moves the invoice to `next`.
    ///
    /// Moving to `PAID` stamps `paid_at` (given value or now). Notes are
    /// replaced only when `notes` is `Some`.
    pub fn transition(
        &mut self,
        next: InvoiceState,
        paid_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BillingError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let notes = validate_notes(notes)?;

        self.state = next;
        if next == InvoiceState::Paid {
            self.paid_at = Some(paid_at.unwrap_or_else(Utc::now));
        }
        if notes.is_some() {
            self.notes = notes;
        }
        Ok(())
    }
}

fn required(field: &'static str, value: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BillingError::InvalidField {
            field,
            reason: "is required",
        });
    }
    if value.chars().count() > max_len {
        return Err(BillingError::InvalidField {
            field,
            reason: "is too long",
        });
    }
    Ok(value.to_string())
}

fn validate_notes(notes: Option<String>) -> Result<Option<String>> {
    match notes {
        Some(n) if n.chars().count() > 500 => Err(BillingError::InvalidField {
            field: "notes",
            reason: "is too long",
        }),
        other => Ok(other),
    }
}
