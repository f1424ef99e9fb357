// =====================================================================================
// SESSION CELL - BREAKER-GUARDED SESSION VALIDATION
// =====================================================================================

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::SessionError;
pub use models::{SessionOutcome, SessionOutcomeWindow, ValidateSessionRequest, ValidateSessionResponse};
pub use router::create_session_router;
pub use services::{ResilientSessionValidator, SessionOutcomeCounters, SessionStore, SESSION_STORE_BREAKER};
