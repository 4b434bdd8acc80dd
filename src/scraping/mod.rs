pub mod browser;
pub mod form;
pub mod service;
pub mod submit;

pub use service::RenameAttempt;
pub use submit::{FormRenamer, RenamerSettings, Verification};
