pub mod handle;
pub mod poller;
pub mod registry;

pub use handle::{StopSignal, TaskHandle};
pub use registry::{PollSettings, RegistryError, TaskRegistry, TaskSpec};
