//! # RedLilium Demos
//!
//! Binaries that drive `redlilium-surface` through a real winit window.
//!
//! ## Available Demos
//!
//! - `surface_demo` - Clears the window every frame, survives resizes and
//!   minimizing, and pushes/pops meshes from the keyboard

pub mod args;

pub use args::DemoArgs;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
