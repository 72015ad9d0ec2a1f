use serde::{Deserialize, Serialize};

pub const ICON_OPTIONS: [&str; 24] = [
    "📚", "📖", "💪", "🏃", "🎯", "✍️", "🎨", "🎵", "🍎", "💊", "🌅", "🧘", "💻", "📝", "🎤",
    "🍵", "🧗", "🚴", "🎹", "📷", "💰", "🌱", "🎮", "🛏️",
];

pub const COLOR_OPTIONS: [&str; 8] = [
    "#FF6B6B", "#4CAF50", "#2196F3", "#FF9800", "#9C27B0", "#607D8B", "#E91E63", "#00BCD4",
];

/// A tracked habit. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One check-in for one calendar on one day (`date` is `YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub calendar_id: String,
    pub date: String,
    pub check_in_time: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_retroactive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retroactive_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

pub const SETTINGS_ID: &str = "user-settings";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: String,
    pub theme: Theme,
    pub version: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            theme: Theme::Light,
            version: SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarStats {
    pub streak: u32,
    pub total: usize,
    pub rate: u32,
    pub checked_today: bool,
}

/// One cell of the 42-cell month grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDayData {
    pub date: String,
    pub day: u32,
    pub is_current_month: bool,
    pub is_today: bool,
    pub is_future: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CheckInRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCalendarParams {
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial calendar edit; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalendarUpdate {
    pub fn apply(&self, calendar: &mut Calendar) {
        if let Some(name) = &self.name {
            calendar.name = name.clone();
        }
        if let Some(icon) = &self.icon {
            calendar.icon = icon.clone();
        }
        if let Some(color) = &self.color {
            calendar.color = color.clone();
        }
        if let Some(description) = &self.description {
            calendar.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInParams {
    pub date: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Fields handed to the repository when inserting a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub calendar_id: String,
    pub date: String,
    pub content: String,
    pub images: Vec<String>,
    pub is_retroactive: bool,
}

/// Partial record edit; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl RecordUpdate {
    pub fn apply(&self, record: &mut CheckInRecord) {
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(images) = &self.images {
            record.images = images.clone();
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    #[serde(flatten)]
    pub calendar: Calendar,
    pub stats: CalendarStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeView {
    pub calendars: Vec<CalendarSummary>,
    pub total_check_ins: usize,
    /// Choices offered when creating or editing a calendar.
    pub icon_options: &'static [&'static str],
    pub color_options: &'static [&'static str],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDetailView {
    pub calendar: Calendar,
    pub stats: CalendarStats,
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDayData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CheckInRecord {
        CheckInRecord {
            id: "r1".into(),
            user_id: None,
            calendar_id: "c1".into(),
            date: "2026-01-05".into(),
            check_in_time: 1_767_600_000_000,
            content: "ran 5k".into(),
            images: vec!["data:image/png;base64,AAAA".into()],
            is_retroactive: false,
            retroactive_time: None,
        }
    }

    #[test]
    fn record_update_keeps_untouched_fields() {
        let mut rec = record();
        RecordUpdate {
            content: Some("ran 10k".into()),
            images: None,
        }
        .apply(&mut rec);
        assert_eq!(rec.content, "ran 10k");
        assert_eq!(rec.images.len(), 1);
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["calendarId"], "c1");
        assert_eq!(json["isRetroactive"], false);
        assert!(json.get("retroactiveTime").is_none());
        assert!(json.get("userId").is_none());
    }
}
