//! `SQLite` implementation of [`EntityStateRepository`].

use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use hearth_app::ports::EntityStateRepository;
use hearth_domain::error::HearthError;
use hearth_domain::id::EntityId;
use hearth_domain::state::{AttributeValue, EntityState};

use crate::SqliteStore;
use crate::error::StorageError;

struct Wrapper(EntityState);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<EntityState> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let entity_id: String = row.try_get("entity_id")?;
        let state_json: String = row.try_get("state")?;
        let updated_at_str: String = row.try_get("updated_at")?;

        let state: HashMap<String, AttributeValue> = serde_json::from_str(&state_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();

        Ok(Self(EntityState {
            entity_id: EntityId::new(entity_id),
            state,
            updated_at,
        }))
    }
}

// Last-write-wins with a monotonic guard: an upsert carrying an older
// timestamp than the stored row is dropped.
const UPSERT: &str = r"
    INSERT INTO entity_state (entity_id, state, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(entity_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
    WHERE excluded.updated_at >= entity_state.updated_at
";

const SELECT_BY_ENTITY: &str = "SELECT * FROM entity_state WHERE entity_id = ?";

impl EntityStateRepository for SqliteStore {
    async fn upsert_entity_state(&self, state: EntityState) -> Result<(), HearthError> {
        let state_json = serde_json::to_string(&state.state).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(state.entity_id.as_str())
            .bind(&state_json)
            .bind(state.updated_at.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn entity_state(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<EntityState>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ENTITY)
            .bind(entity_id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;
    use hearth_domain::time::now;

    fn snapshot(entity: &str, value: f64, ts: hearth_domain::time::Timestamp) -> EntityState {
        let mut state = HashMap::new();
        state.insert("value".to_string(), AttributeValue::Float(value));
        EntityState {
            entity_id: EntityId::new(entity),
            state,
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn should_insert_and_fetch_state() {
        let store = memory_store().await;
        store
            .upsert_entity_state(snapshot("e1", 420.0, now()))
            .await
            .unwrap();

        let fetched = store
            .entity_state(&EntityId::new("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            fetched.state.get("value"),
            Some(&AttributeValue::Float(420.0))
        );
    }

    #[tokio::test]
    async fn should_keep_exactly_one_row_per_entity() {
        let store = memory_store().await;
        let ts = now();
        store
            .upsert_entity_state(snapshot("e1", 1.0, ts))
            .await
            .unwrap();
        store
            .upsert_entity_state(snapshot("e1", 2.0, ts + chrono::Duration::milliseconds(5)))
            .await
            .unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_state")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        let fetched = store
            .entity_state(&EntityId::new("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.state.get("value"), Some(&AttributeValue::Float(2.0)));
    }

    #[tokio::test]
    async fn should_drop_out_of_order_sample() {
        let store = memory_store().await;
        let ts = now();
        store
            .upsert_entity_state(snapshot("e1", 2.0, ts))
            .await
            .unwrap();

        // A sample stamped before the stored row must not win.
        store
            .upsert_entity_state(snapshot("e1", 1.0, ts - chrono::Duration::seconds(5)))
            .await
            .unwrap();

        let fetched = store
            .entity_state(&EntityId::new("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.state.get("value"), Some(&AttributeValue::Float(2.0)));
        assert_eq!(fetched.updated_at, ts);
    }

    #[tokio::test]
    async fn should_return_none_for_unknown_entity() {
        let store = memory_store().await;
        let fetched = store.entity_state(&EntityId::new("ghost")).await.unwrap();
        assert!(fetched.is_none());
    }
}
