pub mod channels;
pub mod config;
pub mod daemon;
pub mod domains;
pub mod error;
pub mod lead_fsm;
pub mod logging;
pub mod mailer;
pub mod notify;
pub mod prompt;
pub mod providers;
pub mod services;
pub mod sessions;
pub mod store;
pub mod training;

pub use error::ConciergeError;

pub type Result<T> = std::result::Result<T, ConciergeError>;
