pub mod peripheral;
pub mod session;
pub mod status;

pub use peripheral::{PeripheralAggregate, PeripheralKind};
pub use session::{
    ActivitySession, ChromeSession, CompletedSession, Identity, LogKind, ProgramSession,
};
pub use status::SystemStatus;
