pub mod store;
pub mod validator;

pub use store::SessionStore;
pub use validator::{ResilientSessionValidator, SessionOutcomeCounters, SESSION_STORE_BREAKER};
