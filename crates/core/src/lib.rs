#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod score;
pub mod time;
pub mod validate;

pub use error::Error;
pub use time::Clock;
