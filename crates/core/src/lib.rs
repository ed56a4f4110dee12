//! Orchestration core of an audio-reactive scene.
//!
//! A single-threaded [`EventLoop`] drives everything: the
//! [`ResourceLoader`] fetches assets concurrently and releases its ready
//! barrier once, the [`Ticker`] publishes one tick per frame, and the
//! [`AnimationController`] turns frequency magnitudes and pointer input into
//! non-overlapping parameter transitions. The [`Orchestrator`] wires these
//! together with the scene, the renderer and the debug panel.

pub mod analysis;
pub mod animation;
pub mod assets;
pub mod audio;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod input;
pub mod mapping;
pub mod orchestrator;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod timeline;

pub use analysis::{AnalyserSettings, SpectrumAnalyser};
pub use animation::{AnimationController, Ease, ParamValue, ParameterSpec, RequestOutcome, Rgb};
pub use assets::{LoaderRegistry, ResourceLoader, SourceDescriptor, SourceKind};
pub use audio::{AudioEngine, FrequencyAnalyser};
pub use config::AppConfig;
pub use debug::DebugPanel;
pub use error::{ResonanceError, Result};
pub use events::{EventBus, SubscriptionToken};
pub use input::InputEvent;
pub use mapping::MappingDescriptor;
pub use orchestrator::Orchestrator;
pub use render::{RenderGraph, RenderSurface, Viewport};
pub use runtime::EventLoop;
pub use scene::{SceneUniforms, World};
pub use timeline::Ticker;
