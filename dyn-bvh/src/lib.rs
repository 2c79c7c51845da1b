mod config;
mod error;
pub mod math;
mod simulation;
pub mod spatial;

pub use config::*;
pub use error::*;
pub use simulation::*;
pub use spatial::{NodeAdapter, NodeId, TreeOptions, VolumeTree};
