pub mod app;
pub mod auth;
pub mod config;
pub mod date;
pub mod errors;
pub mod handlers;
pub mod image;
pub mod models;
pub mod repository;
pub mod state;
pub mod stats;
pub mod store;

pub use app::router;
pub use auth::{AuthProvider, AuthSession, RemoteAuth};
pub use config::{BackendConfig, Config};
pub use errors::{AppError, Error};
pub use repository::{LocalStore, RemoteStore, Repository};
pub use state::AppState;
pub use store::CalendarStore;
