pub mod peripherals;
pub mod session_logs;
pub mod summaries;
pub mod system_status;
