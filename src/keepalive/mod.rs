pub mod container;
pub mod engine;

pub use container::{EngineHost, ThreadedEngineContainer};
pub use engine::{KeepAliveEngine, KeepAliveRecorder, KEEP_ALIVE_WINDOW_SECS};
