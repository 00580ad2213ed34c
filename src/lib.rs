pub mod admin_api;
pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod forms;
pub mod logging;
pub mod models;
pub mod session;
pub mod status_cache;
pub mod survey_service;

pub use api::{create_router, AppState};
pub use auth::AuthService;
pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use forms::SurveyForm;
pub use models::*;
pub use session::SessionManager;
pub use status_cache::StatusCache;
pub use survey_service::SurveyService;
