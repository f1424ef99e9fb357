// =====================================================================================
// CLARITY MONITOR - OPERATOR CLI, DAEMON & COMPOSITE API
// =====================================================================================

pub mod cli;
pub mod client;
pub mod commands;
pub mod daemon;
pub mod render;
pub mod router;

pub use router::create_router;
