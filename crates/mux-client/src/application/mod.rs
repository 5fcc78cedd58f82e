//! Application layer: ownership arbitration, injection targets, hotkeys,
//! and the coordinating controller task.

pub mod controller;
pub mod hotkey;
pub mod service;
pub mod targets;
