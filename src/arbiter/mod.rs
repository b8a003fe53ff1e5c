pub mod controller;
pub mod state;

pub use controller::{ActivityArbiter, ActivityListener, UiListener};
pub use state::{ArbiterState, ArbiterStatus};
