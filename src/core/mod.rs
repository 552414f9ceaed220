//! Core analysis pipeline.
//!
//! This module contains:
//! - Window extraction: aligning two participants' streams onto a common grid
//! - Fusion: combining estimator outputs into the Resonance record

pub mod fusion;
pub mod window;

// Re-export commonly used types
pub use fusion::{fuse, Resonance};
pub use window::{align_pair, AnalysisWindow, ChannelPair, WindowGap};
