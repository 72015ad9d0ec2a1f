use crate::auth::{AuthSession, User};
use crate::date::{normalize_month, today};
use crate::errors::AppError;
use crate::models::{
    COLOR_OPTIONS, Calendar, CalendarDetailView, CalendarStats, CalendarSummary, CalendarUpdate,
    CheckInParams, CheckInRecord, CreateCalendarParams, HomeView, ICON_OPTIONS, RecordUpdate, Theme,
    UserSettings,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ThemeUpdate {
    pub theme: Theme,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub authenticated: bool,
    pub loading: bool,
    pub user: Option<User>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginView {
    #[serde(flatten)]
    pub session: SessionView,
    pub redirect: String,
}

/// Keeps screens behind sign-in when a remote backend is configured.
pub async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(auth) = &state.auth else {
        return next.run(request).await;
    };
    if auth.is_authenticated().await {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if path.starts_with("/api/") {
        AppError::unauthorized("sign in required").into_response()
    } else {
        Redirect::to(&format!("/login?redirect={path}")).into_response()
    }
}

pub async fn home(State(state): State<AppState>) -> Result<Json<HomeView>, AppError> {
    state.store.load_calendars().await?;
    state.store.load_all_records().await;

    let mut calendars = Vec::new();
    for calendar in state.store.calendars().await {
        let stats = state.store.get_calendar_stats(&calendar.id).await?;
        calendars.push(CalendarSummary { calendar, stats });
    }

    Ok(Json(HomeView {
        calendars,
        total_check_ins: state.store.total_check_ins().await,
        icon_options: &ICON_OPTIONS,
        color_options: &COLOR_OPTIONS,
    }))
}

pub async fn calendar_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<CalendarDetailView>, AppError> {
    let calendar = find_calendar(&state, &id).await?;
    state.store.load_records(&id).await?;

    let now = today();
    let (year, month) = normalize_month(
        query.year.unwrap_or(now.year()),
        query.month.unwrap_or(now.month() as i32),
    )?;
    let days = state.store.calendar_days(&id, year, month as i32).await?;
    let stats = state.store.get_calendar_stats(&id).await?;

    Ok(Json(CalendarDetailView {
        calendar,
        stats,
        year,
        month,
        days,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Json<LoginView> {
    let redirect = query
        .redirect
        .filter(|target| target.starts_with('/') && !target.starts_with("//"))
        .unwrap_or_else(|| "/".to_string());
    Json(LoginView {
        session: session_view(state.auth.as_ref()).await,
        redirect,
    })
}

pub async fn session(State(state): State<AppState>) -> Json<SessionView> {
    Json(session_view(state.auth.as_ref()).await)
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionView>, AppError> {
    let auth = auth_session(&state)?;
    auth.sign_up(&credentials.email, &credentials.password).await?;
    Ok(Json(session_view(Some(auth)).await))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionView>, AppError> {
    let auth = auth_session(&state)?;
    auth.sign_in_with_password(&credentials.email, &credentials.password)
        .await?;
    state.store.reset().await;
    Ok(Json(session_view(Some(auth)).await))
}

pub async fn sign_out(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let auth = auth_session(&state)?;
    auth.sign_out().await?;
    state.store.reset().await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_calendars(State(state): State<AppState>) -> Result<Json<Vec<Calendar>>, AppError> {
    state.store.load_calendars().await?;
    Ok(Json(state.store.calendars().await))
}

pub async fn create_calendar(
    State(state): State<AppState>,
    Json(params): Json<CreateCalendarParams>,
) -> Result<(StatusCode, Json<Calendar>), AppError> {
    let calendar = state.store.create_calendar(params).await?;
    Ok((StatusCode::CREATED, Json(calendar)))
}

pub async fn get_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Calendar>, AppError> {
    Ok(Json(find_calendar(&state, &id).await?))
}

pub async fn update_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<CalendarUpdate>,
) -> Result<Json<Calendar>, AppError> {
    Ok(Json(state.store.update_calendar(&id, update).await?))
}

pub async fn delete_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    find_calendar(&state, &id).await?;
    state.store.delete_calendar(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CheckInRecord>>, AppError> {
    find_calendar(&state, &id).await?;
    state.store.load_records(&id).await?;
    Ok(Json(state.store.records_for(&id).await))
}

pub async fn check_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<CheckInParams>,
) -> Result<(StatusCode, Json<CheckInRecord>), AppError> {
    find_calendar(&state, &id).await?;
    state.store.load_records(&id).await?;
    let record = state.store.check_in(&id, params).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn record_by_date(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<CheckInRecord>, AppError> {
    find_calendar(&state, &id).await?;
    state.store.load_records(&id).await?;
    state
        .store
        .get_record_by_date(&id, &date)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no check-in on {date}")))
}

pub async fn calendar_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CalendarStats>, AppError> {
    find_calendar(&state, &id).await?;
    state.store.load_records(&id).await?;
    Ok(Json(state.store.get_calendar_stats(&id).await?))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<RecordUpdate>,
) -> Result<Json<CheckInRecord>, AppError> {
    Ok(Json(state.store.update_record(&id, update).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_record(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<UserSettings>, AppError> {
    let local = state
        .local
        .as_ref()
        .ok_or_else(|| AppError::not_found("settings are only kept by the local store"))?;
    Ok(Json(local.get_settings().await))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<ThemeUpdate>,
) -> Result<Json<UserSettings>, AppError> {
    let local = state
        .local
        .as_ref()
        .ok_or_else(|| AppError::not_found("settings are only kept by the local store"))?;
    Ok(Json(local.update_theme(update.theme).await?))
}

async fn find_calendar(state: &AppState, id: &str) -> Result<Calendar, AppError> {
    state
        .store
        .get_calendar(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("calendar {id} not found")))
}

fn auth_session(state: &AppState) -> Result<&AuthSession, AppError> {
    state
        .auth
        .as_ref()
        .ok_or_else(|| AppError::not_found("sign-in is not enabled for the local store"))
}

async fn session_view(auth: Option<&AuthSession>) -> SessionView {
    match auth {
        Some(auth) => SessionView {
            authenticated: auth.is_authenticated().await,
            loading: auth.is_loading().await,
            user: auth.user().await,
            error: auth.error().await,
        },
        None => SessionView {
            authenticated: true,
            loading: false,
            user: None,
            error: None,
        },
    }
}
