//! `SQLite` implementation of [`CredentialRepository`].
//!
//! One blob per `(device_id, kind)`. Encryption at rest belongs to the
//! deployment (an encrypted filesystem or an `SQLCipher` build); the adapter
//! stores the bytes it is handed.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use hearth_app::ports::CredentialRepository;
use hearth_domain::credential::Credential;
use hearth_domain::error::HearthError;
use hearth_domain::id::DeviceId;

use crate::SqliteStore;
use crate::error::StorageError;

struct Wrapper(Credential);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Credential> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device_id: String = row.try_get("device_id")?;
        let kind: String = row.try_get("kind")?;
        let data: Vec<u8> = row.try_get("data")?;
        let created_at_str: String = row.try_get("created_at")?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();

        Ok(Self(Credential {
            device_id: DeviceId::new(device_id),
            kind,
            data,
            created_at,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO credentials (device_id, kind, data, created_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(device_id, kind) DO UPDATE SET data = excluded.data, created_at = excluded.created_at
";

const SELECT_BY_KIND: &str = "SELECT * FROM credentials WHERE device_id = ? AND kind = ?";
const SELECT_ANY: &str = "SELECT * FROM credentials WHERE device_id = ? LIMIT 1";

impl CredentialRepository for SqliteStore {
    async fn upsert_credential(&self, credential: Credential) -> Result<(), HearthError> {
        sqlx::query(UPSERT)
            .bind(credential.device_id.as_str())
            .bind(&credential.kind)
            .bind(&credential.data)
            .bind(credential.created_at.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn credential(
        &self,
        device_id: &DeviceId,
        kind: Option<&str>,
    ) -> Result<Option<Credential>, HearthError> {
        let row: Option<Wrapper> = match kind {
            Some(kind) => sqlx::query_as(SELECT_BY_KIND)
                .bind(device_id.as_str())
                .bind(kind)
                .fetch_optional(self.pool())
                .await
                .map_err(StorageError::from)?,
            None => sqlx::query_as(SELECT_ANY)
                .bind(device_id.as_str())
                .fetch_optional(self.pool())
                .await
                .map_err(StorageError::from)?,
        };

        Ok(Wrapper::maybe(row))
    }
}
