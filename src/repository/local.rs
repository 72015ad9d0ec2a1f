use super::{Repository, new_id, now_millis};
use crate::errors::Error;
use crate::models::{
    Calendar, CalendarUpdate, CheckInRecord, CreateCalendarParams, NewRecord, RecordUpdate, Theme,
    UserSettings,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// The whole device-local database: three collections in one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalData {
    #[serde(default)]
    pub calendars: Vec<Calendar>,
    #[serde(default)]
    pub records: Vec<CheckInRecord>,
    #[serde(default)]
    pub settings: Option<UserSettings>,
}

/// Single-device backend persisted to a JSON file.
///
/// Every mutation works on a copy of the document under one lock, persists
/// it, and only then replaces the in-memory copy, so a failed write leaves
/// the previous state in place and readers never observe a partial change.
pub struct LocalStore {
    path: PathBuf,
    data: Mutex<LocalData>,
}

impl LocalStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut data = load_data(&path).await;
        if data.settings.is_none() {
            data.settings = Some(UserSettings::default());
            persist_data(&path, &data).await?;
        }
        info!(
            path = %path.display(),
            calendars = data.calendars.len(),
            records = data.records.len(),
            "opened local store"
        );
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub async fn get_settings(&self) -> UserSettings {
        let data = self.data.lock().await;
        data.settings.clone().unwrap_or_default()
    }

    pub async fn update_theme(&self, theme: Theme) -> Result<UserSettings, Error> {
        self.mutate(|data| {
            let settings = data.settings.get_or_insert_with(UserSettings::default);
            settings.theme = theme;
            Ok(settings.clone())
        })
        .await
    }

    /// Adds two starter calendars when the store has none. Returns how many were added.
    pub async fn seed_sample_data(&self) -> Result<usize, Error> {
        self.mutate(|data| {
            if !data.calendars.is_empty() {
                return Ok(0);
            }
            let now = now_millis();
            let samples = [
                ("Daily reading", "📚", "#FF6B6B", "Read for at least 30 minutes"),
                ("Workout", "💪", "#4CAF50", "Exercise for an hour"),
            ];
            for (name, icon, color, description) in samples {
                data.calendars.push(Calendar {
                    id: new_id(),
                    user_id: None,
                    name: name.to_string(),
                    icon: icon.to_string(),
                    color: color.to_string(),
                    description: description.to_string(),
                    created_at: now,
                    updated_at: now,
                });
            }
            Ok(samples.len())
        })
        .await
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut LocalData) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let out = apply(&mut next)?;
        persist_data(&self.path, &next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl Repository for LocalStore {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, Error> {
        let data = self.data.lock().await;
        let mut calendars: Vec<Calendar> = data.calendars.iter().rev().cloned().collect();
        calendars.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(calendars)
    }

    async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>, Error> {
        let data = self.data.lock().await;
        Ok(data.calendars.iter().find(|c| c.id == id).cloned())
    }

    async fn create_calendar(&self, params: CreateCalendarParams) -> Result<Calendar, Error> {
        let now = now_millis();
        let calendar = Calendar {
            id: new_id(),
            user_id: None,
            name: params.name,
            icon: params.icon,
            color: params.color,
            description: params.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let created = calendar.clone();
        self.mutate(move |data| {
            data.calendars.push(calendar);
            Ok(())
        })
        .await?;
        debug!(calendar_id = %created.id, "created calendar");
        Ok(created)
    }

    async fn update_calendar(&self, id: &str, update: CalendarUpdate) -> Result<Calendar, Error> {
        self.mutate(|data| {
            let calendar = data
                .calendars
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| Error::CalendarNotFound(id.to_string()))?;
            update.apply(calendar);
            calendar.updated_at = now_millis();
            Ok(calendar.clone())
        })
        .await
    }

    async fn delete_calendar(&self, id: &str) -> Result<(), Error> {
        let removed = self
            .mutate(|data| {
                data.calendars.retain(|c| c.id != id);
                let before = data.records.len();
                data.records.retain(|r| r.calendar_id != id);
                Ok(before - data.records.len())
            })
            .await?;
        debug!(calendar_id = %id, records = removed, "deleted calendar");
        Ok(())
    }

    async fn list_records_by_calendar(
        &self,
        calendar_id: &str,
    ) -> Result<Vec<CheckInRecord>, Error> {
        let data = self.data.lock().await;
        let mut records: Vec<CheckInRecord> = data
            .records
            .iter()
            .filter(|r| r.calendar_id == calendar_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.check_in_time);
        Ok(records)
    }

    async fn get_record_by_date(
        &self,
        calendar_id: &str,
        date: &str,
    ) -> Result<Option<CheckInRecord>, Error> {
        let data = self.data.lock().await;
        Ok(data
            .records
            .iter()
            .find(|r| r.calendar_id == calendar_id && r.date == date)
            .cloned())
    }

    async fn create_record(&self, new: NewRecord) -> Result<CheckInRecord, Error> {
        self.mutate(|data| {
            if !data.calendars.iter().any(|c| c.id == new.calendar_id) {
                return Err(Error::CalendarNotFound(new.calendar_id.clone()));
            }
            if data
                .records
                .iter()
                .any(|r| r.calendar_id == new.calendar_id && r.date == new.date)
            {
                return Err(Error::DuplicateCheckIn {
                    calendar_id: new.calendar_id.clone(),
                    date: new.date.clone(),
                });
            }
            let now = now_millis();
            let record = CheckInRecord {
                id: new_id(),
                user_id: None,
                calendar_id: new.calendar_id,
                date: new.date,
                check_in_time: now,
                content: new.content,
                images: new.images,
                is_retroactive: new.is_retroactive,
                retroactive_time: new.is_retroactive.then_some(now),
            };
            data.records.push(record.clone());
            Ok(record)
        })
        .await
    }

    async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<CheckInRecord, Error> {
        self.mutate(|data| {
            let record = data
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
            update.apply(record);
            Ok(record.clone())
        })
        .await
    }

    async fn delete_record(&self, id: &str) -> Result<(), Error> {
        self.mutate(|data| {
            data.records.retain(|r| r.id != id);
            Ok(())
        })
        .await
    }
}

pub async fn load_data(path: &Path) -> LocalData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                LocalData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => LocalData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            LocalData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &LocalData) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_data_path() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "checkin_local_{}_{}.json",
            std::process::id(),
            nanos
        ));
        path
    }

    fn params(name: &str) -> CreateCalendarParams {
        CreateCalendarParams {
            name: name.into(),
            icon: "📚".into(),
            color: "#FF6B6B".into(),
            description: None,
        }
    }

    fn new_record(calendar_id: &str, date: &str) -> NewRecord {
        NewRecord {
            calendar_id: calendar_id.into(),
            date: date.into(),
            content: "done".into(),
            images: vec!["data:image/png;base64,AAAA".into()],
            is_retroactive: false,
        }
    }

    #[tokio::test]
    async fn open_creates_settings_row() {
        let path = unique_data_path();
        let store = LocalStore::open(&path).await.unwrap();
        let settings = store.get_settings().await;
        assert_eq!(settings.id, "user-settings");
        assert_eq!(settings.version, 1);
        assert_eq!(settings.theme, Theme::Light);

        store.update_theme(Theme::Dark).await.unwrap();
        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_settings().await.theme, Theme::Dark);
    }

    #[tokio::test]
    async fn calendars_list_newest_first() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        store.create_calendar(params("first")).await.unwrap();
        store.create_calendar(params("second")).await.unwrap();
        let names: Vec<_> = store
            .list_calendars()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn missing_calendar_is_none() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        assert!(store.get_calendar("nope").await.unwrap().is_none());
        assert!(matches!(
            store.update_calendar("nope", CalendarUpdate::default()).await,
            Err(Error::CalendarNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_calendar_merges_fields() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        let created = store.create_calendar(params("read")).await.unwrap();
        let updated = store
            .update_calendar(
                &created.id,
                CalendarUpdate {
                    color: Some("#2196F3".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "read");
        assert_eq!(updated.color, "#2196F3");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn duplicate_check_in_is_rejected() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        let calendar = store.create_calendar(params("read")).await.unwrap();
        store
            .create_record(new_record(&calendar.id, "2026-01-05"))
            .await
            .unwrap();
        let err = store
            .create_record(new_record(&calendar.id, "2026-01-05"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCheckIn { .. }));
        assert_eq!(
            store.list_records_by_calendar(&calendar.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_calendar_cascades_to_records() {
        let path = unique_data_path();
        let store = LocalStore::open(&path).await.unwrap();
        let keep = store.create_calendar(params("keep")).await.unwrap();
        let gone = store.create_calendar(params("drop")).await.unwrap();
        for date in ["2026-01-04", "2026-01-05"] {
            store.create_record(new_record(&gone.id, date)).await.unwrap();
        }
        store
            .create_record(new_record(&keep.id, "2026-01-05"))
            .await
            .unwrap();

        store.delete_calendar(&gone.id).await.unwrap();
        assert!(store.list_records_by_calendar(&gone.id).await.unwrap().is_empty());
        assert!(store.get_record_by_date(&gone.id, "2026-01-05").await.unwrap().is_none());
        assert_eq!(store.list_records_by_calendar(&keep.id).await.unwrap().len(), 1);

        let reopened = LocalStore::open(&path).await.unwrap();
        assert!(reopened.get_calendar(&gone.id).await.unwrap().is_none());
        assert!(reopened.list_records_by_calendar(&gone.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_record_preserves_images() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        let calendar = store.create_calendar(params("read")).await.unwrap();
        let record = store
            .create_record(new_record(&calendar.id, "2026-01-05"))
            .await
            .unwrap();
        let updated = store
            .update_record(
                &record.id,
                RecordUpdate {
                    content: Some("chapter 3".into()),
                    images: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "chapter 3");
        assert_eq!(updated.images, record.images);
    }

    #[tokio::test]
    async fn retroactive_record_gets_backfill_time() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        let calendar = store.create_calendar(params("read")).await.unwrap();
        let mut backfill = new_record(&calendar.id, "2025-12-31");
        backfill.is_retroactive = true;
        let record = store.create_record(backfill).await.unwrap();
        assert_eq!(record.retroactive_time, Some(record.check_in_time));
    }

    #[tokio::test]
    async fn seed_only_fills_empty_store() {
        let store = LocalStore::open(unique_data_path()).await.unwrap();
        assert_eq!(store.seed_sample_data().await.unwrap(), 2);
        assert_eq!(store.seed_sample_data().await.unwrap(), 0);
        assert_eq!(store.list_calendars().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let path = unique_data_path();
        tokio::fs::write(&path, b"not json").await.unwrap();
        let data = load_data(&path).await;
        assert!(data.calendars.is_empty());
    }
}
