#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod proctoring;
pub mod time;
pub mod timer;

pub use error::Error;
pub use time::Clock;
pub use timer::{ExamTimer, TimerTick};
