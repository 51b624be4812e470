//! Live vitals monitoring for the selected patient.
//!
//! `MonitorController` owns the directory watch and at most one
//! `PatientSession`. Sessions carry the auto-analysis trigger and are
//! replaced wholesale on patient switch.

pub mod controller;
pub mod events;
pub mod session;
pub mod trigger;

pub use controller::*;
pub use events::*;
pub use session::*;
pub use trigger::*;
