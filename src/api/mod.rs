//! API layer - HTTP endpoint handlers.

mod handlers;
mod health;
mod models;
mod routes;

pub use models::{
    AdmissionResponse, AdmissionStatus, EmailNotificationRequest, JobStatusResponse,
    WhatsAppNotificationRequest,
};
pub use routes::api_routes;
