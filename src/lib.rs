//! huemirror: camera-driven color mirroring for conference-room smart bulbs
//!
//! Captures live video from a selected camera, continuously estimates the dominant
//! color of the scene and pushes it to a bulb endpoint on demand or on a fixed cadence.
//!
//! # Features
//! - Camera session with release-before-acquire swaps and unlimited reconnects
//! - Histogram dominant color with a deterministic center-mean fallback
//! - Single-slot submission gate shared by manual and automatic triggers
//! - Color backend (`POST /api/color`) or direct Shelly bulb clients
//! - Synthetic camera and recording bulb for offline testing
//!
//! # Usage
//! ```rust,no_run
//! use huemirror::{bulb, MirrorConfig, MirrorPipeline};
//! use huemirror::testing::SyntheticCamera;
//! use huemirror::ColorSample;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = MirrorConfig::load_or_default();
//! let camera = Arc::new(SyntheticCamera::with_device("demo", ColorSample::new(200, 100, 50)));
//! let client = bulb::from_config(&config.bulb, &config.sync)?;
//! let (pipeline, mut events) = MirrorPipeline::new(config, camera, client);
//! pipeline.start().await;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
pub mod bulb;
pub mod config;
pub mod detection;
pub mod errors;
pub mod extract;
pub mod invariants;
pub mod pipeline;
pub mod platform;
pub mod presentation;
pub mod registry;
pub mod session;
pub mod sync;
pub mod types;

// Testing utilities - synthetic camera and bulb for offline testing
pub mod testing;

// Re-exports for convenience
pub use crate::config::MirrorConfig;
pub use errors::{CameraError, ConfigError, ExtractFault, SubmissionError};
pub use pipeline::MirrorPipeline;
pub use platform::CameraBackend;
pub use presentation::{StatusMessage, UiEvent};
pub use sync::SendOutcome;
pub use types::{CaptureConstraints, ColorSample, DeviceDescriptor, VideoFrame};

#[cfg(feature = "native")]
pub use platform::NativeCamera;

/// Initialize logging, defaulting to `huemirror=info` when `RUST_LOG` is unset
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("huemirror=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
