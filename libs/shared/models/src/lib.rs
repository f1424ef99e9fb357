pub mod auth;
pub mod error;

pub use auth::{OperatorClaims, Operator, Principal, SessionRecord};
pub use error::AppError;
