//! Services layer (ports + adapters).
//!
//! - `ports`: provider contract and configuration types (kernel-facing).
//! - `adapters`: OS/runtime specific implementations (IO/async).

pub mod adapters;
pub mod bus;
pub mod ports;

pub use bus::{change_bus, ChangeBus, ChangeCause, ChangeReceiver, StoreChange};
