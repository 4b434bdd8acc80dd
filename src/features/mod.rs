pub mod activity_log;
pub mod credentials;
pub mod recent;
