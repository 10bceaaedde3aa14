pub mod duration;
pub mod error;
pub mod types;
pub mod value;

pub use duration::{format_duration, parse_duration, TICK};
pub use error::ScriptQueueError;
pub use types::*;
pub use value::*;
