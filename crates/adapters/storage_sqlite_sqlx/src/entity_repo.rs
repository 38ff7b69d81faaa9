//! `SQLite` implementation of [`EntityRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use hearth_app::ports::{EntityFilter, EntityRepository};
use hearth_domain::entity::{Capability, Entity, EntityKind};
use hearth_domain::error::HearthError;
use hearth_domain::id::{DeviceId, EntityId, HomeId};

use crate::SqliteStore;
use crate::error::StorageError;

struct Wrapper(Entity);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Entity> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let device_id: String = row.try_get("device_id")?;
        let home_id: String = row.try_get("home_id")?;
        let kind_str: String = row.try_get("kind")?;
        let key: String = row.try_get("key")?;
        let name: String = row.try_get("name")?;
        let capability_json: String = row.try_get("capability")?;

        let kind = EntityKind::from_str(&kind_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let capability: Capability = serde_json::from_str(&capability_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(Entity {
            id: EntityId::new(id),
            device_id: DeviceId::new(device_id),
            home_id: HomeId::new(home_id),
            kind,
            key,
            name,
            capability,
        }))
    }
}

const INSERT: &str = r#"
    INSERT INTO entities (id, device_id, home_id, kind, "key", name, capability)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_BY_ID: &str = "SELECT * FROM entities WHERE id = ?";
const SELECT_BY_KEY: &str = r#"SELECT * FROM entities WHERE device_id = ? AND "key" = ?"#;

impl EntityRepository for SqliteStore {
    async fn insert_entity(&self, entity: Entity) -> Result<Entity, HearthError> {
        let capability_json =
            serde_json::to_string(&entity.capability).map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(entity.id.as_str())
            .bind(entity.device_id.as_str())
            .bind(entity.home_id.as_str())
            .bind(entity.kind.as_str())
            .bind(&entity.key)
            .bind(&entity.name)
            .bind(&capability_json)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(entity)
    }

    async fn entity_by_id(&self, id: &EntityId) -> Result<Option<Entity>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn entity_by_key(
        &self,
        device_id: &DeviceId,
        key: &str,
    ) -> Result<Option<Entity>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_KEY)
            .bind(device_id.as_str())
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>, HearthError> {
        let mut builder = sqlx::QueryBuilder::new("SELECT * FROM entities WHERE 1 = 1");
        if let Some(home_id) = &filter.home_id {
            builder.push(" AND home_id = ");
            builder.push_bind(home_id.as_str());
        }
        if let Some(device_id) = &filter.device_id {
            builder.push(" AND device_id = ");
            builder.push_bind(device_id.as_str());
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind.as_str());
        }

        let rows: Vec<Wrapper> = builder
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
