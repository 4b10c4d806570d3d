#![forbid(unsafe_code)]

pub mod countdown;
pub mod error;
pub mod model;
pub mod scoring;
pub mod time;

pub use countdown::{Countdown, Tick};
pub use error::Error;
pub use time::Clock;
