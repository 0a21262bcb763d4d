pub mod errors;
pub mod messages;
pub mod participant;
pub mod round;

// Re-export all types
pub use errors::*;
pub use messages::*;
pub use participant::*;
pub use round::*;
