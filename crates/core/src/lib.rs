//! Core library for the tuneviz terminal music player.
//!
//! [`AudioEngine`] decodes a [`Track`] on a background thread and feeds the
//! audio device through a bounded buffer; [`VisualizerManager`] turns the
//! chunks it publishes into text frames.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod metadata;
pub mod track;
pub mod visualizer;

pub use analysis::{BandAnalyzer, Smoother, SpectrumAnalyzer};
pub use audio::{
    AudioBackend, AudioChunk, AudioEngine, AudioSource, CallbackId, EngineEvent, FrameBuffer,
    HeadlessBackend, MemorySource, PlaybackState, SourceOpener,
};
pub use config::{AudioConfig, Config, VisualizerConfig};
pub use error::{EngineError, Result, SourceError, TunevizError};
pub use track::Track;
pub use visualizer::{Visualizer, VisualizerManager};
