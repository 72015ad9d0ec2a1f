//! Storage seam for calendars and check-in records.
//!
//! [`LocalStore`] keeps everything in a JSON document on the device;
//! [`RemoteStore`] talks to a hosted table API on behalf of the signed-in user.
//! The store and the date math only ever see [`Repository`].

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;
pub(crate) use remote::check as remote_check;

use crate::errors::Error;
use crate::models::{
    Calendar, CalendarUpdate, CheckInRecord, CreateCalendarParams, NewRecord, RecordUpdate,
};
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
pub trait Repository: Send + Sync {
    /// All calendars in scope, newest first.
    async fn list_calendars(&self) -> Result<Vec<Calendar>, Error>;

    async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>, Error>;

    async fn create_calendar(&self, params: CreateCalendarParams) -> Result<Calendar, Error>;

    async fn update_calendar(&self, id: &str, update: CalendarUpdate) -> Result<Calendar, Error>;

    /// Removes the calendar and every record that belongs to it in one step.
    async fn delete_calendar(&self, id: &str) -> Result<(), Error>;

    /// Records of one calendar, oldest check-in first.
    async fn list_records_by_calendar(&self, calendar_id: &str)
    -> Result<Vec<CheckInRecord>, Error>;

    async fn get_record_by_date(
        &self,
        calendar_id: &str,
        date: &str,
    ) -> Result<Option<CheckInRecord>, Error>;

    /// Fails with [`Error::DuplicateCheckIn`] when the calendar already has a
    /// record for that date.
    async fn create_record(&self, record: NewRecord) -> Result<CheckInRecord, Error>;

    async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<CheckInRecord, Error>;

    async fn delete_record(&self, id: &str) -> Result<(), Error>;
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
