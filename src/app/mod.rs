mod runtime;
mod studio;
mod types;


pub use studio::Studio;
pub use types::ShutdownReason;
