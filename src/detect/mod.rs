//! Detection engine seam.
//!
//! Models are resolved to a `ModelRef`, loaded by the first `ModelLoader` in a
//! `BackendRegistry` that accepts them, and run through `DetectorBackend::detect`.

mod backend;
mod backends;
pub mod catalog;
pub mod postprocess;
mod registry;
mod result;
mod stats;

pub use backend::{DetectorBackend, EngineOptions, ModelLoader, ModelRef};
pub use backends::{ScriptedDetection, StubBackend, StubLoader};
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractLoader};
pub use catalog::{resolve_model, ModelCatalog};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
pub use stats::DetectionStats;
