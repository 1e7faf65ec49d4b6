//! The async combinator layer (spec §2 "async framework", §4.3).

mod result;
mod stitch;
mod subroutine;
mod ticket_holder;

pub use result::{Continuation, FinalResult, ResultSlot};
pub use stitch::{stitch2, stitch3};
pub use subroutine::{FailureMode, Subroutine};
pub use ticket_holder::TicketHolder;
