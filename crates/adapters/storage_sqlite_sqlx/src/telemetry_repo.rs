//! `SQLite` implementation of [`TelemetryRepository`].
//!
//! Telemetry is append-only: rows are inserted in bulk and never rewritten.
//! The retention sweep deletes by age, nothing else touches existing rows.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row};

use hearth_app::ports::TelemetryRepository;
use hearth_domain::error::HearthError;
use hearth_domain::id::{EntityId, HomeId};
use hearth_domain::telemetry::{TelemetryPoint, TelemetryQuery};
use hearth_domain::time::Timestamp;

use crate::SqliteStore;
use crate::error::StorageError;

struct Wrapper(TelemetryPoint);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let entity_id: String = row.try_get("entity_id")?;
        let home_id: String = row.try_get("home_id")?;
        let field: String = row.try_get("field")?;
        let value: Option<f64> = row.try_get("value")?;
        let unit: Option<String> = row.try_get("unit")?;
        let ts_str: String = row.try_get("ts")?;

        let ts = chrono::DateTime::parse_from_rfc3339(&ts_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();

        Ok(Self(TelemetryPoint {
            entity_id: EntityId::new(entity_id),
            home_id: HomeId::new(home_id),
            field,
            value,
            unit,
            ts,
        }))
    }
}

const PURGE_BEFORE: &str = "DELETE FROM telemetry WHERE ts < ?";

fn select_query(
    scope_column: &str,
    scope_value: &str,
    query: &TelemetryQuery,
) -> QueryBuilder<'static, sqlx::Sqlite> {
    let mut builder = QueryBuilder::new("SELECT * FROM telemetry WHERE ");
    builder.push(scope_column);
    builder.push(" = ");
    builder.push_bind(scope_value.to_string());
    if let Some(field) = &query.field {
        builder.push(" AND field = ");
        builder.push_bind(field.clone());
    }
    if let Some(since) = query.since {
        builder.push(" AND ts >= ");
        builder.push_bind(since.to_rfc3339());
    }
    builder.push(" ORDER BY ts ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    builder
}

impl TelemetryRepository for SqliteStore {
    async fn insert_telemetry_batch(
        &self,
        points: &[TelemetryPoint],
    ) -> Result<(), HearthError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO telemetry (entity_id, home_id, field, value, unit, ts) ",
        );
        builder.push_values(points, |mut row, point| {
            row.push_bind(point.entity_id.as_str())
                .push_bind(point.home_id.as_str())
                .push_bind(&point.field)
                .push_bind(point.value)
                .push_bind(&point.unit)
                .push_bind(point.ts.to_rfc3339());
        });

        builder
            .build()
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn telemetry_by_entity(
        &self,
        entity_id: &EntityId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>, HearthError> {
        let rows: Vec<Wrapper> = select_query("entity_id", entity_id.as_str(), query)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn telemetry_by_home(
        &self,
        home_id: &HomeId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>, HearthError> {
        let rows: Vec<Wrapper> = select_query("home_id", home_id.as_str(), query)
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn purge_telemetry_before(&self, cutoff: Timestamp) -> Result<u64, HearthError> {
        let result = sqlx::query(PURGE_BEFORE)
            .bind(cutoff.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;
    use hearth_domain::time::now;

    fn point(entity: &str, field: &str, value: Option<f64>) -> TelemetryPoint {
        let mut point = TelemetryPoint::new(entity, "h1", field, value);
        point.unit = Some("ppm".to_string());
        point
    }

    #[tokio::test]
    async fn should_insert_batch_and_read_back_in_order() {
        let store = memory_store().await;
        let base = now();
        let points: Vec<TelemetryPoint> = (0..5)
            .map(|i| {
                point("e1", "co2", Some(f64::from(400 + i)))
                    .at(base + chrono::Duration::milliseconds(i64::from(i)))
            })
            .collect();

        store.insert_telemetry_batch(&points).await.unwrap();

        let rows = store
            .telemetry_by_entity(&EntityId::new("e1"), &TelemetryQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].value, Some(400.0));
        assert_eq!(rows[4].value, Some(404.0));
    }

    #[tokio::test]
    async fn should_persist_null_for_non_numeric_values() {
        let store = memory_store().await;
        store
            .insert_telemetry_batch(&[point("e1", "status", None)])
            .await
            .unwrap();

        let rows = store
            .telemetry_by_entity(&EntityId::new("e1"), &TelemetryQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, None);
    }

    #[tokio::test]
    async fn should_accept_empty_batch() {
        let store = memory_store().await;
        store.insert_telemetry_batch(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn should_filter_by_field_since_and_limit() {
        let store = memory_store().await;
        let base = now();
        store
            .insert_telemetry_batch(&[
                point("e1", "co2", Some(400.0)).at(base - chrono::Duration::minutes(10)),
                point("e1", "co2", Some(410.0)).at(base - chrono::Duration::minutes(5)),
                point("e1", "co2", Some(420.0)).at(base),
                point("e1", "temperature", Some(21.0)).at(base),
            ])
            .await
            .unwrap();

        let query = TelemetryQuery {
            field: Some("co2".to_string()),
            since: Some(base - chrono::Duration::minutes(7)),
            limit: Some(1),
        };
        let rows = store
            .telemetry_by_entity(&EntityId::new("e1"), &query)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(410.0));
    }

    #[tokio::test]
    async fn should_query_by_home() {
        let store = memory_store().await;
        store
            .insert_telemetry_batch(&[point("e1", "co2", Some(400.0)), {
                let mut other = point("e2", "co2", Some(500.0));
                other.home_id = HomeId::new("h2");
                other
            }])
            .await
            .unwrap();

        let rows = store
            .telemetry_by_home(&HomeId::new("h1"), &TelemetryQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id.as_str(), "e1");
    }

    #[tokio::test]
    async fn should_purge_rows_older_than_cutoff() {
        let store = memory_store().await;
        let base = now();
        store
            .insert_telemetry_batch(&[
                point("e1", "co2", Some(1.0)).at(base - chrono::Duration::days(45)),
                point("e1", "co2", Some(2.0)).at(base),
            ])
            .await
            .unwrap();

        let purged = store
            .purge_telemetry_before(base - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let rows = store
            .telemetry_by_entity(&EntityId::new("e1"), &TelemetryQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(2.0));
    }
}
