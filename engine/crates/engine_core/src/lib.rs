pub mod tick;

pub use tick::{TickConfig, TickLoop, TickReport, TickSystem};
