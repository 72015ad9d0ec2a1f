use super::{Repository, new_id};
use crate::auth::Session;
use crate::errors::Error;
use crate::models::{
    Calendar, CalendarUpdate, CheckInRecord, CreateCalendarParams, NewRecord, RecordUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

const CALENDARS: &str = "calendars";
const RECORDS: &str = "records";

/// Postgres unique-violation code reported by the table API.
const UNIQUE_VIOLATION: &str = "23505";

/// Multi-tenant backend over a hosted REST table API.
///
/// Every request is made with the current session's access token; inserts
/// carry the session's user id. Without a session, every call fails with
/// [`Error::NotAuthenticated`].
pub struct RemoteStore {
    client: Client,
    base_url: String,
    api_key: String,
    session: watch::Receiver<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    id: String,
    #[serde(default)]
    user_id: Option<String>,
    name: String,
    icon: String,
    color: String,
    #[serde(default)]
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CalendarRow> for Calendar {
    fn from(row: CalendarRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            icon: row.icon,
            color: row.color,
            description: row.description.unwrap_or_default(),
            created_at: row.created_at.timestamp_millis(),
            updated_at: row.updated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    id: String,
    #[serde(default)]
    user_id: Option<String>,
    calendar_id: String,
    date: String,
    check_in_time: DateTime<Utc>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    is_retroactive: Option<bool>,
    #[serde(default)]
    retroactive_time: Option<DateTime<Utc>>,
}

impl From<RecordRow> for CheckInRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            calendar_id: row.calendar_id,
            date: row.date,
            check_in_time: row.check_in_time.timestamp_millis(),
            content: row.content.unwrap_or_default(),
            images: row.images.unwrap_or_default(),
            is_retroactive: row.is_retroactive.unwrap_or(false),
            retroactive_time: row.retroactive_time.map(|t| t.timestamp_millis()),
        }
    }
}

#[derive(Debug, Serialize)]
struct CalendarInsert<'a> {
    id: String,
    user_id: &'a str,
    name: String,
    icon: String,
    color: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct CalendarPatch {
    #[serde(flatten)]
    fields: CalendarUpdate,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RecordInsert<'a> {
    id: String,
    user_id: &'a str,
    calendar_id: String,
    date: String,
    check_in_time: DateTime<Utc>,
    content: String,
    images: Vec<String>,
    is_retroactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retroactive_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl RemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        session: watch::Receiver<Option<Session>>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session,
        }
    }

    fn current_session(&self) -> Result<Session, Error> {
        self.session.borrow().clone().ok_or(Error::NotAuthenticated)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, Error> {
        let session = self.current_session()?;
        Ok(self
            .client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(session.access_token))
    }

    async fn fetch_rows<T: DeserializeOwned>(builder: RequestBuilder) -> Result<Vec<T>, Error> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn fetch_first<T: DeserializeOwned>(builder: RequestBuilder) -> Result<Option<T>, Error> {
        let rows = Self::fetch_rows(builder.query(&[("limit", "1")])).await?;
        Ok(rows.into_iter().next())
    }

    async fn execute(builder: RequestBuilder) -> Result<(), Error> {
        check(builder.send().await?).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Passes 2xx responses through; turns everything else into [`Error::Backend`].
pub(crate) async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ApiError>(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(|err| {
            err.message
                .clone()
                .or_else(|| err.msg.clone())
                .or_else(|| err.error_description.clone())
        })
        .unwrap_or(body);
    let message = match parsed.and_then(|err| err.code) {
        Some(code) => format!("{message} ({code})"),
        None => message,
    };
    warn!(status = %status, message = %message, "backend request failed");
    Err(Error::Backend {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Repository for RemoteStore {
    async fn list_calendars(&self) -> Result<Vec<Calendar>, Error> {
        let rows: Vec<CalendarRow> = Self::fetch_rows(
            self.request(Method::GET, CALENDARS)?
                .query(&[("select", "*"), ("order", "created_at.desc")]),
        )
        .await?;
        Ok(rows.into_iter().map(Calendar::from).collect())
    }

    async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>, Error> {
        let row: Option<CalendarRow> = Self::fetch_first(
            self.request(Method::GET, CALENDARS)?
                .query(&[("select", "*".to_string()), ("id", eq(id))]),
        )
        .await?;
        Ok(row.map(Calendar::from))
    }

    async fn create_calendar(&self, params: CreateCalendarParams) -> Result<Calendar, Error> {
        let session = self.current_session()?;
        let body = CalendarInsert {
            id: new_id(),
            user_id: &session.user.id,
            name: params.name,
            icon: params.icon,
            color: params.color,
            description: params.description.unwrap_or_default(),
        };
        let row: Option<CalendarRow> = Self::fetch_rows(
            self.request(Method::POST, CALENDARS)?
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await?
        .into_iter()
        .next();
        let calendar = row.map(Calendar::from).ok_or_else(|| Error::Backend {
            status: 200,
            message: "insert returned no row".to_string(),
        })?;
        debug!(calendar_id = %calendar.id, "created remote calendar");
        Ok(calendar)
    }

    async fn update_calendar(&self, id: &str, update: CalendarUpdate) -> Result<Calendar, Error> {
        let body = CalendarPatch {
            fields: update,
            updated_at: Utc::now(),
        };
        let rows: Vec<CalendarRow> = Self::fetch_rows(
            self.request(Method::PATCH, CALENDARS)?
                .query(&[("id", eq(id))])
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await?;
        rows.into_iter()
            .next()
            .map(Calendar::from)
            .ok_or_else(|| Error::CalendarNotFound(id.to_string()))
    }

    /// The `records.calendar_id` foreign key cascades, so the records go in
    /// the same database transaction as the calendar row.
    async fn delete_calendar(&self, id: &str) -> Result<(), Error> {
        Self::execute(
            self.request(Method::DELETE, CALENDARS)?
                .query(&[("id", eq(id))]),
        )
        .await?;
        debug!(calendar_id = %id, "deleted remote calendar");
        Ok(())
    }

    async fn list_records_by_calendar(
        &self,
        calendar_id: &str,
    ) -> Result<Vec<CheckInRecord>, Error> {
        let rows: Vec<RecordRow> = Self::fetch_rows(self.request(Method::GET, RECORDS)?.query(&[
            ("select", "*".to_string()),
            ("calendar_id", eq(calendar_id)),
            ("order", "check_in_time.asc".to_string()),
        ]))
        .await?;
        Ok(rows.into_iter().map(CheckInRecord::from).collect())
    }

    async fn get_record_by_date(
        &self,
        calendar_id: &str,
        date: &str,
    ) -> Result<Option<CheckInRecord>, Error> {
        let row: Option<RecordRow> = Self::fetch_first(self.request(Method::GET, RECORDS)?.query(&[
            ("select", "*".to_string()),
            ("calendar_id", eq(calendar_id)),
            ("date", eq(date)),
        ]))
        .await?;
        Ok(row.map(CheckInRecord::from))
    }

    async fn create_record(&self, new: NewRecord) -> Result<CheckInRecord, Error> {
        let session = self.current_session()?;
        if self
            .get_record_by_date(&new.calendar_id, &new.date)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateCheckIn {
                calendar_id: new.calendar_id,
                date: new.date,
            });
        }

        let now = Utc::now();
        let body = RecordInsert {
            id: new_id(),
            user_id: &session.user.id,
            calendar_id: new.calendar_id.clone(),
            date: new.date.clone(),
            check_in_time: now,
            content: new.content,
            images: new.images,
            is_retroactive: new.is_retroactive,
            retroactive_time: new.is_retroactive.then_some(now),
        };
        let result = Self::fetch_rows::<RecordRow>(
            self.request(Method::POST, RECORDS)?
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await;

        match result {
            Ok(rows) => rows
                .into_iter()
                .next()
                .map(CheckInRecord::from)
                .ok_or_else(|| Error::Backend {
                    status: 200,
                    message: "insert returned no row".to_string(),
                }),
            Err(Error::Backend { message, .. }) if message.contains(UNIQUE_VIOLATION) => {
                Err(Error::DuplicateCheckIn {
                    calendar_id: new.calendar_id,
                    date: new.date,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<CheckInRecord, Error> {
        let rows: Vec<RecordRow> = Self::fetch_rows(
            self.request(Method::PATCH, RECORDS)?
                .query(&[("id", eq(id))])
                .header("Prefer", "return=representation")
                .json(&update),
        )
        .await?;
        rows.into_iter()
            .next()
            .map(CheckInRecord::from)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))
    }

    async fn delete_record(&self, id: &str) -> Result<(), Error> {
        Self::execute(self.request(Method::DELETE, RECORDS)?.query(&[("id", eq(id))])).await
    }
}
