//! Transport abstraction (Telegram today, anything with polling + replies tomorrow).

pub mod port;
pub mod throttled;
pub mod types;
