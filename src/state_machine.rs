//! Per-participant survey conversation state machine
//!
//! Pure state transitions: the runtime feeds events in and executes the
//! effects that come back.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvState};
pub use transition::{transition, TransitionError};
