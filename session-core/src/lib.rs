pub mod directives;
pub mod guesses;
pub mod leaderboard;
pub mod roster;
pub mod round;
pub mod scoring;

// Re-export main components
pub use directives::*;
pub use guesses::*;
pub use leaderboard::*;
pub use roster::*;
pub use round::*;
pub use scoring::*;
