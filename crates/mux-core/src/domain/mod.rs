//! Pure domain entities shared by the protocol client and the controller.
//!
//! Nothing in this module performs I/O or depends on an async runtime; the
//! ownership and roster logic is plain data manipulation, tested in place.

pub mod buttons;
pub mod roster;
