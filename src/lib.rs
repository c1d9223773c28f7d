//! Canvas compositing engine for a hair-restoration preview tool.
//!
//! Face bounds become an editable hairline or scalp region, free-hand hair
//! strands accumulate on per-timeframe drawing layers, and either one is
//! turned into a binary mask, a colored preview and a generation request.

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod assets;
pub mod canvas;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;

pub use canvas::{CanvasView, DrawingLayer, to_display_space, to_image_space};
pub use error::{HairlineError, Result};
pub use project::ImageSession;
