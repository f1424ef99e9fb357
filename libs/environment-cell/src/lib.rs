// =====================================================================================
// ENVIRONMENT CELL - DEPLOYMENT FINGERPRINTS, COMPARISON & VERIFICATION
// =====================================================================================

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::EnvironmentError;
pub use models::{
    CheckStatus, Comparison, EnvironmentFingerprint, ExpectedDeployment, FieldDifference, TargetProbe,
    ValidationCheck, ValidationReport, VerificationReport,
};
pub use router::create_environment_router;
pub use services::{compare_fingerprints, local_fingerprint, EnvironmentInspector};
