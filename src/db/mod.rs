mod connection;
mod dao;
pub(crate) mod helpers;
mod migrations;
pub mod models;
pub(crate) mod repositories;
mod sink;
mod writes;

pub use connection::Database;
pub use dao::{PeripheralDao, SessionLogDao, StatusDao, SummaryDao};
pub use sink::{BatchConfig, DirectSink, QueuedSink, WriteSink, MAX_FLUSH_INTERVAL};
pub use writes::{apply_write, StoreWrite};
