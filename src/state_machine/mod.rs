mod context;
mod machine;
mod state;

pub use context::{BeadContext, BeadType, ContextStore, VerificationTier, phase_number};
pub use machine::{BeadMachine, InitArgs, VerifyOutcome};
pub use state::State;
