pub mod fan_out;

pub use fan_out::{run_bounded, FanOutExecutor, ItemFailure, Outcome};
