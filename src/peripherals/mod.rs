pub mod bus;
pub mod timeline;
pub mod tracker;

pub use bus::{PeripheralBus, PeripheralTimeouts};
pub use timeline::{precompute_day, precompute_timeline};
pub use tracker::{AggregateSink, PeripheralTracker};
