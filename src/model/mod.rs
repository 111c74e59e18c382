//! Pure data structures shared by the provisioner, the image cache and the orchestrator.

pub mod fixture;
pub mod image;
pub mod launch;

pub use fixture::*;
pub use image::*;
pub use launch::*;
