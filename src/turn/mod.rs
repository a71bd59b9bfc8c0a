//! The turn-taking state machine and the events it publishes.

pub mod controller;
pub mod events;
pub mod state;

pub use controller::{Collaborators, TurnController};
pub use events::TurnEvent;
pub use state::{TurnState, VoiceTurn};
