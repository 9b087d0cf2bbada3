//! Rooms and rounds for Scrawl.
//!
//! A room is a short-code container for one match. The [`RoomRegistry`]
//! owns every room in the process and enforces the cross-room rules (one
//! room per identity, rooms vanish when empty, idle rooms get swept); each
//! [`Room`] runs the round state machine for its own participants.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: get-or-create, leave, list, idle sweep, routing
//! - [`Room`]: phases, guessing, scoring, reveal scheduler, drawer grace
//! - [`RoomTimerFired`]: what room timers send back to the engine
//! - [`RoomConfig`] / [`GameConfig`]: limits and rules
//! - [`logic`]: the pure rules (matching, scoring, masking)

mod codes;
mod config;
mod error;
pub mod logic;
mod manager;
mod room;
mod words;

pub use codes::{CODE_ALPHABET, CodeGenerator, RandomCodes, SequenceCodes};
pub use config::{GameConfig, RoomConfig};
pub use error::RoomError;
pub use manager::{Joined, RoomRegistry, SweptRoom};
pub use room::{Outbound, Participant, Room, RoomTimer, RoomTimerFired, TimerSender};
pub use words::DEFAULT_WORDS;
