//! Cardboard VR - native core of the Cardboard sample app
//!
//! Renders a head-locked, video-textured quad in stereo through the Cardboard
//! SDK: head tracking with pose prediction, lens distortion from the scanned
//! viewer profile, and an off-screen render target warped onto the display.
//!
//! The Java activity drives everything through the exports in `jni_glue`.
//! Off-device, `mock` provides an in-memory SDK and GL driver.

pub mod app;
pub mod config;
pub mod device_params;
pub mod error;
pub mod gfx;
pub mod pose;
pub mod renderer;
pub mod scene;
pub mod sdk;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "android")]
mod jni_glue;

pub use app::{CardboardApp, FrameStatus};
pub use config::AppConfig;
pub use device_params::{CacheState, DeviceParamsCache, RefreshOutcome};
pub use error::{Result, VrError};
pub use pose::HeadPose;
