//! Small shared utilities

mod throttle;

pub use throttle::LogThrottler;
