//! Simulated devices.
//!
//! Each device exposes a schema builder for its PVs and, where it has
//! periodic behavior, a [`SimTask`](simioc_common::sim::SimTask).

pub mod btps;
pub mod camera;
pub mod dscan;
pub mod heartbeat;
pub mod motor;
pub mod positioner;
pub mod range;
pub mod spectrometer;
pub mod undulator;
pub mod valve;
