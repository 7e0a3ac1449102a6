//! Domain model: kinds, outcomes and errors.

pub mod errors;
pub mod kind;
pub mod outcome;

pub use self::errors::{TetherError, TetherResult};
pub use self::kind::{Kind, KindState};
pub use self::outcome::{Outcome, OutcomeKind};
