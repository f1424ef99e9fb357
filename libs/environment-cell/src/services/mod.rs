pub mod inspector;

pub use inspector::{compare_fingerprints, local_fingerprint, EnvironmentInspector};
