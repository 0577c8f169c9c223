//! session.event.v1 schema
//!
//! The recorded input of one coaching session: landmark frames, upstream
//! results, transport outcomes, transcript turns, auditory scores and
//! calibration records, in arrival order.

mod adapter;
mod session_event;

pub use adapter::*;
pub use session_event::*;
