//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the sandbox.
//! Business crates may only depend on this crate, reverse dependencies are prohibited.
//!
//! ## SDK boundary
//! The depth-camera vendor SDK is an external collaborator. It is modelled here as a
//! set of object-safe traits (`DeviceContext`, `Device`, `Sensor`, `FrameSynchronizer`)
//! so the lifecycle coordinators never depend on a concrete backend.

mod config;
mod console;
mod error;
mod result;
mod sdk;
mod stream;

pub use config::*;
pub use console::{Console, ReportLevel};
pub use error::*;
pub use result::{aggregate_status, DeviceResult, DeviceStatus, LifecycleStage};
pub use sdk::*;
pub use stream::*;
