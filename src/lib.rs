pub mod core;
pub mod features;
pub mod scraping;
pub mod tasks;
pub mod web;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

pub use features::{activity_log, credentials};
pub use scraping::{form, submit};
