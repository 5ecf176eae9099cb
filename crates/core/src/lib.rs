#![forbid(unsafe_code)]

pub mod model;
pub mod object_url;
pub mod progress;
pub mod time;

pub use time::Clock;
