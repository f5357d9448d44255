use async_trait::async_trait;
use common::{FarmerId, HarvestId, InvoiceId};

use crate::{Farmer, Harvest, HarvestState, Result};

/// Persistence for farmers and harvests.
#[async_trait]
pub trait HarvestStore: Send + Sync {
    async fn insert_farmer(&self, farmer: &Farmer) -> Result<()>;

    async fn get_farmer(&self, id: FarmerId) -> Result<Option<Farmer>>;

    /// Lists farmers, oldest registration first.
    async fn list_farmers(&self) -> Result<Vec<Farmer>>;

    /// Replaces a farmer's fields. Returns false if it does not exist.
    async fn update_farmer(&self, farmer: &Farmer) -> Result<bool>;

    /// Returns false if the farmer did not exist.
    async fn delete_farmer(&self, id: FarmerId) -> Result<bool>;

    async fn insert_harvest(&self, harvest: &Harvest) -> Result<()>;

    async fn get_harvest(&self, id: HarvestId) -> Result<Option<Harvest>>;

    /// Lists harvests, newest first.
    async fn list_harvests(&self) -> Result<Vec<Harvest>>;

    /// Lists a farmer's harvests, newest first.
    async fn list_harvests_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Harvest>>;

    /// Replaces a harvest's product, quantity and state, but only while its
    /// stored state is still `expected_state`.
    ///
    /// Returns false if the harvest is gone or its state has moved on.
    async fn update_harvest(&self, harvest: &Harvest, expected_state: HarvestState)
    -> Result<bool>;

    /// Deletes a harvest while it is `Registered`.
    ///
    /// Returns false if no `Registered` harvest with this id exists.
    async fn delete_registered_harvest(&self, id: HarvestId) -> Result<bool>;

    /// Records the invoice issued for a harvest. Returns false if the
    /// harvest does not exist.
    async fn set_invoice(&self, id: HarvestId, invoice_id: InvoiceId) -> Result<bool>;
}
