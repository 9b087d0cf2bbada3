//! Cancelable timers and injectable clocks for Scrawl.
//!
//! Every deadline in the engine (round clock, letter reveal, inter-round
//! delay, drawer grace) is a [`TimerHandle`] owned by the record it
//! affects. Timers never touch engine state themselves: when they fire they
//! push an event into the engine's channel, and the engine handles it on
//! its single event-loop task like any other input.
//!
//! # Stale firings
//!
//! Aborting a timer task cannot recall an event it already queued. Every
//! handle therefore carries a [`TimerId`], the event carries the same ID,
//! and the owner ignores any firing whose ID no longer matches the handle
//! it currently holds.
//!
//! ```ignore
//! let handle = spawn_interval(Duration::from_secs(1), tx.clone(), move |id, tick| {
//!     RoomTimerFired { code: code.clone(), kind: TimerKind::RoundClock, id }
//! });
//! room.round_clock = Some(handle); // dropping it later cancels the job
//! ```

mod clock;
mod timer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use timer::{TimerHandle, TimerId, spawn_interval, spawn_once};
