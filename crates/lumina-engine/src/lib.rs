//! # lumina-engine
//!
//! Render loop and playback state machine for Lumina.
//!
//! Features:
//! - Internal or clock-master time sources behind one trait
//! - Adaptive peak detection driving contour hue rotation
//! - Flood-controlled command emission (dedup plus bounded resend)
//! - Fixed-rate render thread with panic isolation per tick

pub mod clock;
pub mod detector;
pub mod executor;
pub mod mapper;
pub mod player;
pub mod render;

#[cfg(test)]
mod testing;

pub use clock::{ClockMaster, InternalClock, ManualClock, TimeSource};
pub use executor::Executor;
pub use player::{Player, PlayerState};
