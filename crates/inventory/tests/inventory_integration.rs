//! Inventory ledger behaviour against in-memory storage and bus.

use std::sync::Arc;

use chrono::Utc;
use common::{ErrorKind, HarvestId};
use contracts::{Contract, HarvestCreated, queues};
use event_bus::{ConsumerWorker, EventBus, EventEnvelope, InMemoryEventBus, RetryPolicy};
use inventory::formula::{FERTILIZER_ITEM, SEED_ITEM};
use inventory::{
    ConsumptionOutcome, HarvestCreatedConsumer, InMemoryInventoryStore, InventoryError,
    InventoryItem, InventoryService, InventoryStore, ItemUpdate, NewItem, Requirement,
};
use rust_decimal::Decimal;

fn service() -> InventoryService {
    InventoryService::new(Arc::new(InMemoryInventoryStore::new()))
}

fn new_item(name: &str, stock: i64, category: Option<&str>) -> NewItem {
    NewItem {
        name: name.to_string(),
        stock,
        unit: None,
        category: category.map(str::to_string),
    }
}

async fn seed_supplies(service: &InventoryService) -> (InventoryItem, InventoryItem) {
    let seed = service
        .create_item(new_item(SEED_ITEM, 1_000, Some("seeds")))
        .await
        .unwrap();
    let fertilizer = service
        .create_item(new_item(FERTILIZER_ITEM, 500, Some("fertilizers")))
        .await
        .unwrap();
    (seed, fertilizer)
}

fn harvest_created(harvest_id: HarvestId, quantity: Decimal) -> HarvestCreated {
    HarvestCreated {
        harvest_id,
        product: "ARROZ".to_string(),
        quantity,
        timestamp: Utc::now(),
    }
}

async fn worker(service: &InventoryService) -> (Arc<InMemoryEventBus>, ConsumerWorker) {
    let bus = Arc::new(InMemoryEventBus::with_policy(RetryPolicy::immediate(3)));
    let worker = ConsumerWorker::new(
        bus.clone(),
        Arc::new(HarvestCreatedConsumer::new(service.clone())),
    );
    worker.bind().await.unwrap();
    (bus, worker)
}

#[tokio::test]
async fn harvest_created_consumes_supplies() {
    let service = service();
    let (seed, fertilizer) = seed_supplies(&service).await;
    let (bus, worker) = worker(&service).await;

    let event = harvest_created(HarvestId::new(), Decimal::from(10));
    bus.publish(event.to_envelope().unwrap()).await.unwrap();

    let stats = worker.run_until_idle().await.unwrap();
    assert_eq!(stats.acked, 1);

    assert_eq!(service.get_item(seed.id).await.unwrap().stock, 950);
    assert_eq!(service.get_item(fertilizer.id).await.unwrap().stock, 480);
}

#[tokio::test]
async fn redelivered_harvest_is_consumed_once() {
    let service = service();
    let (seed, fertilizer) = seed_supplies(&service).await;
    let (bus, worker) = worker(&service).await;

    let envelope = harvest_created(HarvestId::new(), Decimal::from(10))
        .to_envelope()
        .unwrap();
    bus.publish(envelope.clone()).await.unwrap();
    bus.publish(envelope).await.unwrap();

    let stats = worker.run_until_idle().await.unwrap();
    assert_eq!(stats.acked, 2);

    assert_eq!(service.get_item(seed.id).await.unwrap().stock, 950);
    assert_eq!(service.get_item(fertilizer.id).await.unwrap().stock, 480);
}

#[tokio::test]
async fn consumption_may_drive_stock_negative() {
    let service = service();
    let seed = service
        .create_item(new_item(SEED_ITEM, 3, None))
        .await
        .unwrap();

    let outcome = service
        .consume_for_harvest(&harvest_created(HarvestId::new(), Decimal::from(2)))
        .await
        .unwrap();

    assert!(matches!(outcome, ConsumptionOutcome::Applied { .. }));
    assert_eq!(service.get_item(seed.id).await.unwrap().stock, -7);
}

#[tokio::test]
async fn stock_overflow_leaves_the_ledger_untouched() {
    let store = InMemoryInventoryStore::new();
    let seed = InventoryItem::new(new_item(SEED_ITEM, 10, None)).unwrap();
    let fertilizer = InventoryItem::new(new_item(FERTILIZER_ITEM, 0, None)).unwrap();
    store.insert(&seed).await.unwrap();
    store.insert(&fertilizer).await.unwrap();

    let drain = |quantity| Requirement {
        item_name: FERTILIZER_ITEM.to_string(),
        quantity,
    };
    let first = HarvestId::new();
    store
        .consume_for_harvest(first, &[drain(i64::MAX)])
        .await
        .unwrap();

    // The seed row would apply fine; the fertilizer row would pass i64::MIN.
    let second = HarvestId::new();
    let seed_req = Requirement {
        item_name: SEED_ITEM.to_string(),
        quantity: 4,
    };
    let err = store
        .consume_for_harvest(second, &[seed_req, drain(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::StockOutOfRange(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(store.get(seed.id).await.unwrap().unwrap().stock, 10);
    assert_eq!(
        store.get(fertilizer.id).await.unwrap().unwrap().stock,
        -i64::MAX
    );
    assert!(store.is_processed(first).await);
    assert!(!store.is_processed(second).await);
}

#[tokio::test]
async fn stats_report_an_overflowing_total() {
    let service = service();
    service
        .create_item(new_item("silo-a", i64::MAX, None))
        .await
        .unwrap();
    service
        .create_item(new_item("silo-b", 1, None))
        .await
        .unwrap();

    let err = service.stats().await.unwrap_err();
    assert!(matches!(err, InventoryError::StockOutOfRange(_)));
}

#[tokio::test]
async fn missing_rows_are_reported_and_acknowledged() {
    let service = service();
    let seed = service
        .create_item(new_item("Seed-Rice", 100, None))
        .await
        .unwrap();

    let outcome = service
        .consume_for_harvest(&harvest_created(HarvestId::new(), Decimal::from(1)))
        .await
        .unwrap();

    match outcome {
        ConsumptionOutcome::Applied { applied, missing } => {
            assert_eq!(applied.len(), 1);
            assert_eq!(missing, vec![FERTILIZER_ITEM.to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    // Row names match ignoring case.
    assert_eq!(service.get_item(seed.id).await.unwrap().stock, 95);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_harvests_lose_no_updates() {
    let service = service();
    let (seed, fertilizer) = seed_supplies(&service).await;
    let harvests = 50;

    let mut handles = Vec::new();
    for _ in 0..harvests {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .consume_for_harvest(&harvest_created(HarvestId::new(), Decimal::from(2)))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Each harvest of 2 tons takes 10 seed and 4 fertilizer.
    assert_eq!(
        service.get_item(seed.id).await.unwrap().stock,
        1_000 - harvests * 10
    );
    assert_eq!(
        service.get_item(fertilizer.id).await.unwrap().stock,
        500 - harvests * 4
    );
}

#[tokio::test]
async fn malformed_event_is_dead_lettered() {
    let service = service();
    let (bus, worker) = worker(&service).await;

    let envelope = EventEnvelope::builder()
        .event_type(HarvestCreated::EVENT_TYPE)
        .payload_raw(serde_json::json!({"harvestId": 42}))
        .build()
        .unwrap();
    bus.publish(envelope).await.unwrap();

    let stats = worker.run_until_idle().await.unwrap();
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(
        bus.dead_letters(queues::INVENTORY_HARVEST_CREATED)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn names_are_unique_ignoring_case() {
    let service = service();
    service
        .create_item(new_item("Urea", 10, None))
        .await
        .unwrap();

    let err = service
        .create_item(new_item("UREA", 5, None))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::DuplicateName(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let other = service
        .create_item(new_item("Potash", 5, None))
        .await
        .unwrap();
    let rename = service
        .update_item(
            other.id,
            ItemUpdate {
                name: "urea".to_string(),
                stock: 5,
                unit: None,
                category: None,
            },
        )
        .await;
    assert!(matches!(rename, Err(InventoryError::DuplicateName(_))));
}

#[tokio::test]
async fn stock_operations() {
    let service = service();
    let item = service
        .create_item(new_item("Urea", 10, None))
        .await
        .unwrap();

    let err = service.set_stock(item.id, -1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(service.set_stock(item.id, 40).await.unwrap().stock, 40);
    assert_eq!(service.adjust_stock(item.id, -15).await.unwrap().stock, 25);
    assert_eq!(service.adjust_stock(item.id, 5).await.unwrap().stock, 30);

    let err = service.adjust_stock(item.id, -31).await.unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientStock { .. }));
    assert_eq!(service.get_item(item.id).await.unwrap().stock, 30);

    service.delete_item(item.id).await.unwrap();
    assert!(matches!(
        service.set_stock(item.id, 1).await,
        Err(InventoryError::ItemNotFound(_))
    ));
}

#[tokio::test]
async fn queries_and_stats() {
    let service = service();
    service
        .create_item(new_item("Urea", 4, Some("fertilizers")))
        .await
        .unwrap();
    service
        .create_item(new_item("Potash", 10, Some("fertilizers")))
        .await
        .unwrap();
    service
        .create_item(new_item("Corn seed", 300, Some("seeds")))
        .await
        .unwrap();
    service
        .create_item(new_item("Gloves", 0, None))
        .await
        .unwrap();

    let names: Vec<String> = service
        .list_items()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["Corn seed", "Gloves", "Potash", "Urea"]);

    let fertilizers = service.list_by_category("fertilizers").await.unwrap();
    assert_eq!(fertilizers.len(), 2);

    let low: Vec<i64> = service
        .low_stock(None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.stock)
        .collect();
    assert_eq!(low, vec![0, 4, 10]);
    assert_eq!(service.low_stock(Some(4)).await.unwrap().len(), 2);

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total_items, 4);
    assert_eq!(stats.total_stock, 314);
    assert_eq!(stats.low_stock_items, 3);
    assert_eq!(stats.items_per_category.get("fertilizers"), Some(&2));
    assert_eq!(stats.items_per_category.get("seeds"), Some(&1));
}
