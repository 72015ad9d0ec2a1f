use crate::date::{WeekStart, generate_calendar_days_at, is_future_at, parse_date, today};
use crate::errors::Error;
use crate::image::validate_image_refs;
use crate::models::{
    Calendar, CalendarDayData, CalendarStats, CalendarUpdate, CheckInParams, CheckInRecord,
    CreateCalendarParams, NewRecord, RecordUpdate,
};
use crate::repository::Repository;
use crate::stats::build_stats_at;
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct StoreState {
    calendars: Vec<Calendar>,
    records: Vec<CheckInRecord>,
    error: Option<String>,
}

/// In-memory copy of the session's calendars and records.
///
/// Every write goes to the repository first and is mirrored into the cache
/// only on success, so a failed call leaves the cache as it was. Reads such
/// as [`CalendarStore::get_calendar_stats`] never touch the repository.
pub struct CalendarStore {
    repository: Arc<dyn Repository>,
    week_start: WeekStart,
    state: RwLock<StoreState>,
    in_flight: AtomicUsize,
    changes: watch::Sender<u64>,
}

struct Loading<'a>(&'a AtomicUsize);

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CalendarStore {
    pub fn new(repository: Arc<dyn Repository>, week_start: WeekStart) -> Self {
        Self {
            repository,
            week_start,
            state: RwLock::new(StoreState::default()),
            in_flight: AtomicUsize::new(0),
            changes: watch::channel(0).0,
        }
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    /// Ticks once per state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn calendars(&self) -> Vec<Calendar> {
        self.state.read().await.calendars.clone()
    }

    pub async fn calendar(&self, id: &str) -> Option<Calendar> {
        let state = self.state.read().await;
        state.calendars.iter().find(|c| c.id == id).cloned()
    }

    pub async fn records(&self) -> Vec<CheckInRecord> {
        self.state.read().await.records.clone()
    }

    pub async fn records_for(&self, calendar_id: &str) -> Vec<CheckInRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .filter(|r| r.calendar_id == calendar_id)
            .cloned()
            .collect()
    }

    pub async fn total_check_ins(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn get_record_by_date(&self, calendar_id: &str, date: &str) -> Option<CheckInRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .find(|r| r.calendar_id == calendar_id && r.date == date)
            .cloned()
    }

    pub async fn get_calendar_stats(&self, calendar_id: &str) -> Result<CalendarStats, Error> {
        self.get_calendar_stats_at(calendar_id, today()).await
    }

    pub async fn get_calendar_stats_at(
        &self,
        calendar_id: &str,
        today: NaiveDate,
    ) -> Result<CalendarStats, Error> {
        build_stats_at(today, &self.records_for(calendar_id).await)
    }

    /// The 42-cell grid for one calendar, filled from the cached records.
    pub async fn calendar_days(
        &self,
        calendar_id: &str,
        year: i32,
        month: i32,
    ) -> Result<Vec<CalendarDayData>, Error> {
        let records = self.records_for(calendar_id).await;
        generate_calendar_days_at(year, month, &records, today(), self.week_start)
    }

    pub async fn load_calendars(&self) -> Result<(), Error> {
        let _loading = self.begin().await;
        match self.repository.list_calendars().await {
            Ok(calendars) => {
                self.state.write().await.calendars = calendars;
                self.notify();
                Ok(())
            }
            Err(err) => self.fail("load calendars", err).await,
        }
    }

    /// Reloads the records of every cached calendar. A calendar whose records
    /// fail to load is skipped.
    pub async fn load_all_records(&self) {
        let calendars = self.calendars().await;
        if calendars.is_empty() {
            return;
        }
        let _loading = self.begin().await;
        let mut all = Vec::new();
        for calendar in &calendars {
            match self.repository.list_records_by_calendar(&calendar.id).await {
                Ok(records) => all.extend(records),
                Err(err) => warn!(calendar_id = %calendar.id, "failed to load records: {err}"),
            }
        }
        all.sort_by_key(|r| r.check_in_time);
        self.state.write().await.records = all;
        self.notify();
    }

    /// Replaces the cached records of one calendar with a fresh copy.
    pub async fn load_records(&self, calendar_id: &str) -> Result<(), Error> {
        let _loading = self.begin().await;
        match self.repository.list_records_by_calendar(calendar_id).await {
            Ok(records) => {
                let mut state = self.state.write().await;
                state.records.retain(|r| r.calendar_id != calendar_id);
                state.records.extend(records);
                state.records.sort_by_key(|r| r.check_in_time);
                drop(state);
                self.notify();
                Ok(())
            }
            Err(err) => self.fail("load records", err).await,
        }
    }

    /// Cached calendar, falling back to the repository on a cache miss.
    pub async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>, Error> {
        if let Some(calendar) = self.calendar(id).await {
            return Ok(Some(calendar));
        }
        let _loading = self.begin().await;
        match self.repository.get_calendar(id).await {
            Ok(Some(calendar)) => {
                let mut state = self.state.write().await;
                if !state.calendars.iter().any(|c| c.id == calendar.id) {
                    state.calendars.push(calendar.clone());
                    state
                        .calendars
                        .sort_by(|a, b| b.created_at.cmp(&a.created_at));
                }
                Ok(Some(calendar))
            }
            Ok(None) => Ok(None),
            Err(err) => self.fail("load calendar", err).await,
        }
    }

    pub async fn create_calendar(&self, params: CreateCalendarParams) -> Result<Calendar, Error> {
        let _loading = self.begin().await;
        if params.name.trim().is_empty() {
            return self
                .fail("create calendar", Error::validation("calendar name is required"))
                .await;
        }
        match self.repository.create_calendar(params).await {
            Ok(calendar) => {
                self.state.write().await.calendars.insert(0, calendar.clone());
                self.notify();
                info!(calendar_id = %calendar.id, name = %calendar.name, "calendar created");
                Ok(calendar)
            }
            Err(err) => self.fail("create calendar", err).await,
        }
    }

    pub async fn update_calendar(
        &self,
        id: &str,
        update: CalendarUpdate,
    ) -> Result<Calendar, Error> {
        let _loading = self.begin().await;
        if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return self
                .fail("update calendar", Error::validation("calendar name is required"))
                .await;
        }
        match self.repository.update_calendar(id, update).await {
            Ok(calendar) => {
                let mut state = self.state.write().await;
                if let Some(slot) = state.calendars.iter_mut().find(|c| c.id == id) {
                    *slot = calendar.clone();
                }
                drop(state);
                self.notify();
                Ok(calendar)
            }
            Err(err) => self.fail("update calendar", err).await,
        }
    }

    pub async fn delete_calendar(&self, id: &str) -> Result<(), Error> {
        let _loading = self.begin().await;
        match self.repository.delete_calendar(id).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.calendars.retain(|c| c.id != id);
                state.records.retain(|r| r.calendar_id != id);
                drop(state);
                self.notify();
                info!(calendar_id = %id, "calendar deleted");
                Ok(())
            }
            Err(err) => self.fail("delete calendar", err).await,
        }
    }

    /// Records a check-in. A date other than today is stored as retroactive;
    /// future dates are refused.
    pub async fn check_in(
        &self,
        calendar_id: &str,
        params: CheckInParams,
    ) -> Result<CheckInRecord, Error> {
        let _loading = self.begin().await;
        let today = today();
        if let Err(err) = self.validate_check_in(calendar_id, &params, today).await {
            return self.fail("check in", err).await;
        }

        let new = NewRecord {
            calendar_id: calendar_id.to_string(),
            is_retroactive: parse_date(&params.date).is_ok_and(|date| date != today),
            date: params.date,
            content: params.content,
            images: params.images,
        };
        match self.repository.create_record(new).await {
            Ok(record) => {
                self.state.write().await.records.push(record.clone());
                self.notify();
                info!(
                    calendar_id = %record.calendar_id,
                    date = %record.date,
                    retroactive = record.is_retroactive,
                    "checked in"
                );
                Ok(record)
            }
            Err(err) => self.fail("check in", err).await,
        }
    }

    async fn validate_check_in(
        &self,
        calendar_id: &str,
        params: &CheckInParams,
        today: NaiveDate,
    ) -> Result<(), Error> {
        parse_date(&params.date)?;
        if is_future_at(&params.date, today) {
            return Err(Error::validation("cannot check in on a future date"));
        }
        validate_image_refs(&params.images)?;
        if self.get_record_by_date(calendar_id, &params.date).await.is_some() {
            return Err(Error::DuplicateCheckIn {
                calendar_id: calendar_id.to_string(),
                date: params.date.clone(),
            });
        }
        Ok(())
    }

    pub async fn update_record(
        &self,
        id: &str,
        update: RecordUpdate,
    ) -> Result<CheckInRecord, Error> {
        let _loading = self.begin().await;
        if let Some(images) = &update.images {
            if let Err(err) = validate_image_refs(images) {
                return self.fail("update record", err).await;
            }
        }
        match self.repository.update_record(id, update).await {
            Ok(record) => {
                let mut state = self.state.write().await;
                if let Some(slot) = state.records.iter_mut().find(|r| r.id == id) {
                    *slot = record.clone();
                }
                drop(state);
                self.notify();
                Ok(record)
            }
            Err(err) => self.fail("update record", err).await,
        }
    }

    pub async fn delete_record(&self, id: &str) -> Result<(), Error> {
        let _loading = self.begin().await;
        match self.repository.delete_record(id).await {
            Ok(()) => {
                self.state.write().await.records.retain(|r| r.id != id);
                self.notify();
                Ok(())
            }
            Err(err) => self.fail("delete record", err).await,
        }
    }

    /// Drops all cached state, e.g. after sign-out.
    pub async fn reset(&self) {
        *self.state.write().await = StoreState::default();
        self.notify();
    }

    async fn begin(&self) -> Loading<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let loading = Loading(&self.in_flight);
        self.state.write().await.error = None;
        loading
    }

    async fn fail<T>(&self, action: &str, err: Error) -> Result<T, Error> {
        warn!(action, "{err}");
        self.state.write().await.error = Some(err.to_string());
        Err(err)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}
