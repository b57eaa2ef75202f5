//! General-purpose transforms that do not depend on any particular command set.

mod early_terminator;
mod readback;

pub use early_terminator::EarlyTerminator;
pub use readback::Readback;
