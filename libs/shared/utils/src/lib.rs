pub mod extractor;
pub mod jwt;
pub mod test_utils;

pub use extractor::{bearer_token, operator_auth_middleware, OperatorAuth};
pub use jwt::validate_operator_token;
