//! firewatch
//!
//! Smoke and fire detection workstation: frames from a camera, a video file or
//! a still image are run through an object detector on a background worker,
//! and the UI thread renders overlays, per-class counts, FPS and status.
//!
//! # Architecture
//!
//! ```text
//! Presenter ──start──▶ Worker thread
//!     ▲                  │ load model (detect), open source (ingest)
//!     │                  │ loop: pull frame → detect → publish
//!     └──pump── Mailbox (latest publication) + event queue (status, FPS, finish)
//! ```
//!
//! Only three things cross the thread boundary: the single-slot mailbox, the
//! ordered event queue and the atomic confidence threshold. The worker stops
//! cooperatively and is always joined before the presenter returns to idle.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (cameras, video files, still images, `stub://`)
//! - `detect`: detector trait, model loaders, model catalog, NMS, stats
//! - `worker`: acquisition/inference thread, mailbox, FPS counter
//! - `presenter`: UI-thread controller
//! - `render`, `palette`: detection overlays
//! - `recorder`: saving annotated frames
//! - `train`: training driver for the external library
//! - `config`, `error`: configuration and the session error taxonomy

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod palette;
pub mod presenter;
pub mod recorder;
pub mod render;
pub mod train;
pub mod worker;

pub use config::{AppConfig, SessionConfig};
pub use detect::{BackendRegistry, BoundingBox, Detection, DetectionStats, DetectorBackend};
pub use error::{SessionError, Severity};
pub use frame::{Frame, Publication};
pub use ingest::{FrameSource, SourceDescriptor, SourceRead};
pub use presenter::Presenter;
pub use worker::{Worker, WorkerEvent, WorkerHandle, WorkerState};
