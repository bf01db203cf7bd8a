//! Application core — pure domain logic, zero I/O.
//!
//! The wake cycle's business rules (datalog, sleep scheduling, upload
//! protocol) talk to the outside world only through the **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals or a broker.

pub mod events;
pub mod ports;
