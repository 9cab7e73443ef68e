//! PostgreSQL record store tests.
//!
//! Run with `--features db-tests` against a database configured through the
//! `VITRINE_DB_*` variables.

#![cfg(feature = "db-tests")]

use vitrine_api::{DbConfig, PgRecordStore};
use vitrine_core::*;
use vitrine_storage::RecordStore;
use vitrine_test_utils::{assertions, fixtures};

async fn test_store() -> VitrineResult<PgRecordStore> {
    let store = PgRecordStore::from_config(&DbConfig::from_env())?;
    store.migrate().await?;
    Ok(store)
}

fn unique_sku(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
async fn pg_record_lifecycle() -> VitrineResult<()> {
    let store = test_store().await?;
    let sku = unique_sku("PG");

    let created = store
        .insert(NewRecord {
            sku: sku.clone(),
            ..fixtures::widget()
        })
        .await?;
    let id = created.value.id;
    assert_eq!(created.event, LifecycleEvent::Created(id));
    assert_eq!(created.value.price.cents(), 999);

    let updated = store
        .update(
            id,
            RecordPatch {
                name: Some("Gadget".to_string()),
                ..RecordPatch::default()
            },
        )
        .await?;
    assert_eq!(updated.value.name, "Gadget");
    assert!(updated.value.updated_at >= created.value.updated_at);

    let deleted = store.soft_delete(id).await?;
    assert!(deleted.value.deleted_at.is_some());
    assert!(store.get(id, false).await?.is_none());
    assert!(store.get(id, true).await?.is_some());
    assertions::assert_not_found(&store.soft_delete(id).await);

    let restored = store.restore(id).await?;
    assert!(restored.value.deleted_at.is_none());
    assertions::assert_conflict(&store.restore(id).await);

    store.hard_delete(id).await?;
    assert!(store.get(id, true).await?.is_none());
    assertions::assert_not_found(&store.hard_delete(id).await);
    Ok(())
}

#[tokio::test]
async fn pg_duplicate_sku_conflicts() -> VitrineResult<()> {
    let store = test_store().await?;
    let sku = unique_sku("DUP");
    let first = store
        .insert(NewRecord {
            sku: sku.clone(),
            ..fixtures::widget()
        })
        .await?;

    let second = store
        .insert(NewRecord {
            sku,
            ..fixtures::gadget()
        })
        .await;
    assertions::assert_conflict(&second);

    store.hard_delete(first.value.id).await?;
    Ok(())
}

#[tokio::test]
async fn pg_live_ids_skip_soft_deleted() -> VitrineResult<()> {
    let store = test_store().await?;
    let mut ids = Vec::new();
    for record in fixtures::small_catalog() {
        let sku = unique_sku(&record.sku);
        ids.push(store.insert(NewRecord { sku, ..record }).await?.value.id);
    }
    store.soft_delete(ids[1]).await?;

    let after = RecordId::new(ids[0].get() - 1);
    let live = store.live_ids_after(Some(after), 100).await?;
    assert!(live.contains(&ids[0]));
    assert!(!live.contains(&ids[1]));
    assert!(live.contains(&ids[2]));

    for id in ids {
        store.hard_delete(id).await?;
    }
    Ok(())
}
