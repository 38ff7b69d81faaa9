//! `SQLite` implementation of [`HomeRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use hearth_app::ports::HomeRepository;
use hearth_domain::error::HearthError;
use hearth_domain::home::Home;
use hearth_domain::id::HomeId;

use crate::SqliteStore;
use crate::error::StorageError;

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(Home);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Home> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let timezone: Option<String> = row.try_get("timezone")?;
        let created_at_str: String = row.try_get("created_at")?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();

        Ok(Self(Home {
            id: HomeId::new(id),
            name,
            timezone,
            created_at,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO homes (id, name, timezone, created_at)
    VALUES (?, ?, ?, ?)
";

const SELECT_BY_ID: &str = "SELECT * FROM homes WHERE id = ?";
const SELECT_BY_NAME: &str = "SELECT * FROM homes WHERE name = ?";

impl HomeRepository for SqliteStore {
    async fn insert_home(&self, home: Home) -> Result<Home, HearthError> {
        sqlx::query(INSERT)
            .bind(home.id.as_str())
            .bind(&home.name)
            .bind(&home.timezone)
            .bind(home.created_at.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(home)
    }

    async fn home_by_id(&self, id: &HomeId) -> Result<Option<Home>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn home_by_name(&self, name: &str) -> Result<Option<Home>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_NAME)
            .bind(name)
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

    #[tokio::test]
    async fn should_insert_and_fetch_home_by_name() {
        let store = memory_store().await;
        let home = Home::new("Default Home", Some("Europe/Paris".into())).unwrap();
        let id = home.id.clone();

        store.insert_home(home).await.unwrap();

        let fetched = store.home_by_name("Default Home").await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.timezone.as_deref(), Some("Europe/Paris"));
    }

    #[tokio::test]
    async fn should_fetch_home_by_id() {
        let store = memory_store().await;
        let home = Home::new("Default Home", None).unwrap();
        let id = home.id.clone();
        store.insert_home(home).await.unwrap();

        let fetched = store.home_by_id(&id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn should_return_none_for_unknown_home() {
        let store = memory_store().await;
        let fetched = store.home_by_name("Nowhere").await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn should_reject_duplicate_home_name() {
        let store = memory_store().await;
        store
            .insert_home(Home::new("Default Home", None).unwrap())
            .await
            .unwrap();

        let result = store
            .insert_home(Home::new("Default Home", None).unwrap())
            .await;
        assert!(result.is_err());
    }
}
