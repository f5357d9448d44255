//! HTTP API and process wiring for the harvest choreography.
//!
//! Exposes the registry, inventory and billing services over REST, with
//! structured logging (tracing), Prometheus metrics and dead-letter
//! inspection. Also builds the consumer workers that connect the three
//! services through the event bus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use billing::{BillingService, HarvestInProcessConsumer, InMemoryInvoiceStore, PostgresInvoiceStore};
use contracts::queues;
use event_bus::{BusError, ConsumerWorker, EventBus};
use inventory::{
    HarvestCreatedConsumer, InMemoryInventoryStore, InventoryService, PostgresInventoryStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use registry::{HarvestService, InMemoryHarvestStore, InvoiceLinkConsumer, PostgresHarvestStore};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub harvests: HarvestService,
    pub inventory: InventoryService,
    pub billing: BillingService,
    pub bus: Arc<dyn EventBus>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{bus, farmers, harvests, health, inventory, invoices, metrics};

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check))
        // Registry
        .route("/farmers", get(farmers::list).post(farmers::create))
        .route(
            "/farmers/{id}",
            get(farmers::get).put(farmers::update).delete(farmers::delete),
        )
        .route("/harvests", get(harvests::list).post(harvests::create))
        .route(
            "/harvests/{id}",
            get(harvests::get)
                .put(harvests::update)
                .delete(harvests::delete),
        )
        .route("/harvests/{id}/state", put(harvests::change_state))
        .route("/harvests/{id}/advance", post(harvests::advance))
        // Inventory
        .route(
            "/inventory/items",
            get(inventory::list).post(inventory::create),
        )
        .route("/inventory/items/low-stock", get(inventory::low_stock))
        .route("/inventory/stats", get(inventory::stats))
        .route(
            "/inventory/items/{id}",
            get(inventory::get)
                .put(inventory::update)
                .delete(inventory::delete),
        )
        .route("/inventory/items/{id}/stock", put(inventory::set_stock))
        .route("/inventory/items/{id}/adjust", post(inventory::adjust_stock))
        // Billing
        .route("/invoices", get(invoices::list).post(invoices::create))
        .route("/invoices/stats", get(invoices::stats))
        .route("/invoices/harvest/{harvest_id}", get(invoices::by_harvest))
        .route(
            "/invoices/{id}",
            get(invoices::get).delete(invoices::delete),
        )
        .route("/invoices/{id}/state", put(invoices::change_state))
        // Bus
        .route("/bus/queues/{queue}/dead-letters", get(bus::dead_letters))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by in-memory stores.
pub fn create_default_state(bus: Arc<dyn EventBus>) -> Arc<AppState> {
    Arc::new(AppState {
        harvests: HarvestService::new(Arc::new(InMemoryHarvestStore::new()), bus.clone()),
        inventory: InventoryService::new(Arc::new(InMemoryInventoryStore::new())),
        billing: BillingService::new(Arc::new(InMemoryInvoiceStore::new()), bus.clone()),
        bus,
    })
}

/// Creates application state backed by PostgreSQL stores sharing `pool`.
pub fn create_postgres_state(pool: PgPool, bus: Arc<dyn EventBus>) -> Arc<AppState> {
    Arc::new(AppState {
        harvests: HarvestService::new(Arc::new(PostgresHarvestStore::new(pool.clone())), bus.clone()),
        inventory: InventoryService::new(Arc::new(PostgresInventoryStore::new(pool.clone()))),
        billing: BillingService::new(Arc::new(PostgresInvoiceStore::new(pool)), bus.clone()),
        bus,
    })
}

/// Declares every service queue and its event-type bindings.
pub async fn bind_queues(bus: &dyn EventBus) -> Result<(), BusError> {
    for (queue, event_types) in queues::BINDINGS {
        bus.bind(queue, event_types).await?;
    }
    Ok(())
}

/// One worker per consumer: inventory, billing and the registry's invoice link.
pub fn consumer_workers(state: &AppState, poll_interval: Duration) -> Vec<ConsumerWorker> {
    let consumers: Vec<Arc<dyn event_bus::Consumer>> = vec![
        Arc::new(HarvestCreatedConsumer::new(state.inventory.clone())),
        Arc::new(HarvestInProcessConsumer::new(state.billing.clone())),
        Arc::new(InvoiceLinkConsumer::new(state.harvests.clone())),
    ];

    consumers
        .into_iter()
        .map(|consumer| {
            ConsumerWorker::new(state.bus.clone(), consumer).with_poll_interval(poll_interval)
        })
        .collect()
}

/// Registers descriptions for the metrics the services record.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!("registry_harvests_created_total", "Harvests registered");
    describe_counter!(
        "registry_state_transitions_total",
        "Harvest state changes by from/to state"
    );
    describe_counter!(
        "registry_events_published_total",
        "Integration events published by the registry"
    );
    describe_counter!(
        "inventory_consumptions_total",
        "Harvests whose supplies were consumed"
    );
    describe_counter!(
        "inventory_duplicate_deliveries_total",
        "HarvestCreated deliveries skipped as already consumed"
    );
    describe_counter!("billing_invoices_created_total", "Invoices issued");
    describe_counter!(
        "billing_duplicate_deliveries_total",
        "HarvestInProcess deliveries skipped as already invoiced"
    );
    describe_counter!(
        "billing_state_transitions_total",
        "Invoice state changes by from/to state"
    );
    describe_counter!("bus_messages_published_total", "Messages enqueued by the bus");
    describe_counter!("bus_messages_acked_total", "Deliveries acknowledged");
    describe_counter!("bus_messages_redelivered_total", "Deliveries requeued after a failure");
    describe_counter!(
        "bus_messages_dead_lettered_total",
        "Messages moved to a dead-letter store"
    );
    describe_histogram!(
        "consumer_handle_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent in a consumer handler"
    );
}
