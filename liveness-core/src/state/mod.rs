pub mod phase;
mod session;

pub use phase::SessionPhase;
pub use session::{LoopAction, Render, SessionOutcome, SessionState, Transition};
