//! `SQLite` implementation of [`DeviceRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use hearth_app::ports::DeviceRepository;
use hearth_domain::device::Device;
use hearth_domain::error::HearthError;
use hearth_domain::id::{DeviceId, HomeId};
use hearth_domain::time::Timestamp;

use crate::SqliteStore;
use crate::error::StorageError;

struct Wrapper(Device);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Device> {
        value.map(|w| w.0)
    }
}

fn parse_ts(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let home_id: String = row.try_get("home_id")?;
        let protocol: String = row.try_get("protocol")?;
        let name: String = row.try_get("name")?;
        let vendor: Option<String> = row.try_get("vendor")?;
        let model: Option<String> = row.try_get("model")?;
        let address: Option<String> = row.try_get("address")?;
        let fingerprint: Option<String> = row.try_get("fingerprint")?;
        let paired_at_str: Option<String> = row.try_get("paired_at")?;
        let last_seen_str: String = row.try_get("last_seen")?;

        let paired_at = paired_at_str.as_deref().map(parse_ts).transpose()?;
        let last_seen = parse_ts(&last_seen_str)?;

        Ok(Self(Device {
            id: DeviceId::new(id),
            home_id: HomeId::new(home_id),
            protocol,
            name,
            vendor,
            model,
            address,
            fingerprint,
            paired_at,
            last_seen,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO devices (id, home_id, protocol, name, vendor, model, address, fingerprint, paired_at, last_seen)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE devices
    SET home_id = ?, protocol = ?, name = ?, vendor = ?, model = ?, address = ?,
        fingerprint = ?, paired_at = ?, last_seen = ?
    WHERE id = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_BY_FINGERPRINT: &str =
    "SELECT * FROM devices WHERE home_id = ? AND fingerprint = ?";
const SELECT_BY_ADDRESS: &str = r"
    SELECT * FROM devices
    WHERE home_id = ? AND address = ? AND vendor IS ? AND model IS ?
";
const SELECT_BY_HOME: &str = "SELECT * FROM devices WHERE home_id = ?";
const SET_PAIRED: &str = "UPDATE devices SET paired_at = ? WHERE id = ?";
const TOUCH_LAST_SEEN: &str = "UPDATE devices SET last_seen = ? WHERE id = ?";

impl DeviceRepository for SqliteStore {
    async fn insert_device(&self, device: Device) -> Result<Device, HearthError> {
        sqlx::query(INSERT)
            .bind(device.id.as_str())
            .bind(device.home_id.as_str())
            .bind(&device.protocol)
            .bind(&device.name)
            .bind(&device.vendor)
            .bind(&device.model)
            .bind(&device.address)
            .bind(&device.fingerprint)
            .bind(device.paired_at.map(|ts| ts.to_rfc3339()))
            .bind(device.last_seen.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(device)
    }

    async fn update_device(&self, device: Device) -> Result<Device, HearthError> {
        sqlx::query(UPDATE)
            .bind(device.home_id.as_str())
            .bind(&device.protocol)
            .bind(&device.name)
            .bind(&device.vendor)
            .bind(&device.model)
            .bind(&device.address)
            .bind(&device.fingerprint)
            .bind(device.paired_at.map(|ts| ts.to_rfc3339()))
            .bind(device.last_seen.to_rfc3339())
            .bind(device.id.as_str())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(device)
    }

    async fn device_by_id(&self, id: &DeviceId) -> Result<Option<Device>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn device_by_fingerprint(
        &self,
        home_id: &HomeId,
        fingerprint: &str,
    ) -> Result<Option<Device>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_FINGERPRINT)
            .bind(home_id.as_str())
            .bind(fingerprint)
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn device_by_address(
        &self,
        home_id: &HomeId,
        address: &str,
        vendor: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<Device>, HearthError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ADDRESS)
            .bind(home_id.as_str())
            .bind(address)
            .bind(vendor)
            .bind(model)
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn devices_by_home(&self, home_id: &HomeId) -> Result<Vec<Device>, HearthError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_HOME)
            .bind(home_id.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn set_device_paired(
        &self,
        id: &DeviceId,
        paired_at: Timestamp,
    ) -> Result<(), HearthError> {
        sqlx::query(SET_PAIRED)
            .bind(paired_at.to_rfc3339())
            .bind(id.as_str())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn touch_device_last_seen(
        &self,
        id: &DeviceId,
        last_seen: Timestamp,
    ) -> Result<(), HearthError> {
        sqlx::query(TOUCH_LAST_SEEN)
            .bind(last_seen.to_rfc3339())
            .bind(id.as_str())
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;
    use hearth_app::ports::HomeRepository;
    use hearth_domain::home::Home;

    async fn setup() -> (SqliteStore, HomeId) {
        let store = memory_store().await;
        let home = Home::new("Default Home", None).unwrap();
        let home_id = home.id.clone();
        store.insert_home(home).await.unwrap();
        (store, home_id)
    }

    fn test_device(home_id: &HomeId) -> Device {
        let mut device = Device::builder()
            .id(DeviceId::new("esphome-aabbcc"))
            .home_id(home_id.clone())
            .protocol("esphome")
            .name("Air Monitor")
            .build()
            .unwrap();
        device.vendor = Some("Acme".into());
        device.model = Some("AM-1".into());
        device.address = Some("10.0.0.1".into());
        device.fingerprint = Some("F1".into());
        device
    }

    #[tokio::test]
    async fn should_insert_and_fetch_device() {
        let (store, home_id) = setup().await;
        let device = test_device(&home_id);
        let id = device.id.clone();

        store.insert_device(device).await.unwrap();

        let fetched = store.device_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.protocol, "esphome");
        assert_eq!(fetched.fingerprint.as_deref(), Some("F1"));
        assert!(fetched.paired_at.is_none());
    }

    #[tokio::test]
    async fn should_find_device_by_fingerprint() {
        let (store, home_id) = setup().await;
        store.insert_device(test_device(&home_id)).await.unwrap();

        let found = store
            .device_by_fingerprint(&home_id, "F1")
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = store
            .device_by_fingerprint(&home_id, "F2")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn should_enforce_fingerprint_uniqueness_per_home() {
        let (store, home_id) = setup().await;
        store.insert_device(test_device(&home_id)).await.unwrap();

        let mut duplicate = test_device(&home_id);
        duplicate.id = DeviceId::new("esphome-other");
        let result = store.insert_device(duplicate).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_find_device_by_address_vendor_model() {
        let (store, home_id) = setup().await;
        store.insert_device(test_device(&home_id)).await.unwrap();

        let found = store
            .device_by_address(&home_id, "10.0.0.1", Some("Acme"), Some("AM-1"))
            .await
            .unwrap();
        assert!(found.is_some());

        let wrong_vendor = store
            .device_by_address(&home_id, "10.0.0.1", Some("Other"), Some("AM-1"))
            .await
            .unwrap();
        assert!(wrong_vendor.is_none());
    }

    #[tokio::test]
    async fn should_match_null_vendor_and_model_with_is() {
        let (store, home_id) = setup().await;
        let mut device = test_device(&home_id);
        device.fingerprint = None;
        device.vendor = None;
        device.model = None;
        store.insert_device(device).await.unwrap();

        let found = store
            .device_by_address(&home_id, "10.0.0.1", None, None)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn should_set_paired_and_touch_last_seen() {
        let (store, home_id) = setup().await;
        let device = test_device(&home_id);
        let id = device.id.clone();
        let inserted_last_seen = device.last_seen;
        store.insert_device(device).await.unwrap();

        let ts = hearth_domain::time::now();
        store.set_device_paired(&id, ts).await.unwrap();
        store.touch_device_last_seen(&id, ts).await.unwrap();

        let fetched = store.device_by_id(&id).await.unwrap().unwrap();
        assert!(fetched.paired_at.is_some());
        assert!(fetched.last_seen >= inserted_last_seen);
    }

    #[tokio::test]
    async fn should_list_devices_by_home() {
        let (store, home_id) = setup().await;
        store.insert_device(test_device(&home_id)).await.unwrap();

        let devices = store.devices_by_home(&home_id).await.unwrap();
        assert_eq!(devices.len(), 1);

        let other = store
            .devices_by_home(&HomeId::new("other"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn should_update_device_row() {
        let (store, home_id) = setup().await;
        let mut device = test_device(&home_id);
        let id = device.id.clone();
        store.insert_device(device.clone()).await.unwrap();

        device.name = "Air Monitor v2".to_string();
        device.address = Some("10.0.0.9".to_string());
        store.update_device(device).await.unwrap();

        let fetched = store.device_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Air Monitor v2");
        assert_eq!(fetched.address.as_deref(), Some("10.0.0.9"));
    }
}
