//! Input debouncing, the I/O-expander driver and its bus lock.

pub mod bus_lock;
pub mod button;
pub mod coin;
pub mod edge_flags;
pub mod tca9535;
