//! Master stack implementations.
//!
//! - [`simulation`] - Software master with simulated servo drives
//!
//! # Adding a master stack
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement [`crate::master::MasterStack`] over the vendor library
//! 3. Construct it in `main.rs` next to the simulation master

pub mod simulation;
