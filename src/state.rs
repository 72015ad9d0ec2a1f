use crate::auth::AuthSession;
use crate::repository::LocalStore;
use crate::store::CalendarStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CalendarStore>,
    /// Present only with the remote backend; `None` means no sign-in is needed.
    pub auth: Option<AuthSession>,
    /// Present only with the local backend, which owns the settings row.
    pub local: Option<Arc<LocalStore>>,
}

impl AppState {
    pub fn local(store: Arc<LocalStore>, calendars: CalendarStore) -> Self {
        Self {
            store: Arc::new(calendars),
            auth: None,
            local: Some(store),
        }
    }

    pub fn remote(calendars: CalendarStore, auth: AuthSession) -> Self {
        Self {
            store: Arc::new(calendars),
            auth: Some(auth),
            local: None,
        }
    }
}
