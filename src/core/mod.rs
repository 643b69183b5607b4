pub mod config;
pub mod email_service;
pub mod jwt_auth;
pub mod permission_checker;
mod responses;
mod telemetry;

pub use self::config::AppConfig;
pub use email_service::{DisabledNotifier, EmailService, NotificationError, NotificationSender};
pub use permission_checker::is_authorized;
pub use responses::*;
pub use telemetry::*;
