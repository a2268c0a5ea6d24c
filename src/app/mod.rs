//! Application core. Pure domain logic, no I/O.
//!
//! This module contains the business rules for the FullWash controller:
//! input polling, session orchestration, relay reconciliation and event
//! reporting. All interaction with hardware and the network happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
