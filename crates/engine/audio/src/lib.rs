//! Interactive audio engine for Old Tom: The Living Legend
//!
//! This crate provides the real-time audio layer of the narrated story:
//! - 3D emitters around a listener with attenuation, panning and Doppler
//! - Ocean acoustics (environment presets plus a submersion overlay)
//! - Emotion-, interaction- and story-driven layer mixing
//! - A performance governor that trades fidelity for frame budget
//! - A logical clock and scheduler so every timed action is deterministic
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        AudioEngine                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  LayerMixer            │  PerformanceGovernor                │
//! │  - emotion smoothing   │  - capability tiers                 │
//! │  - interaction fx      │  - metric thresholds + cooldown     │
//! │  - story cues/triggers │  - battery / background brackets    │
//! ├────────────┬───────────┴─────────────────────────────────────┤
//! │            ▼ bus gains, moves, one-shots   ▼ source caps      │
//! │  SpatialField (emitters, listener, environment, submersion)  │
//! │  ReverbBus (impulse per reverb category)                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here talks to an audio device. Each tick the field produces an
//! [`EmitterMix`] per audible emitter, which a platform backend turns into
//! gain/pan/rate node parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! use oldtom_audio::{AudioEngine, AudioEngineConfig, AudioResource, EmitterOptions};
//! use glam::Vec3;
//!
//! let mut engine = AudioEngine::new(AudioEngineConfig::default());
//! engine.init(&probe)?;
//!
//! let waves = AudioResource::pcm("waves", samples, 44_100, 1);
//! let field = engine.field_mut()?;
//! field.create_emitter("waves", &waves, Vec3::new(0.0, 0.0, -5.0), EmitterOptions::looping("ambience"))?;
//! field.play("waves", 0.0, 0.0, None)?;
//!
//! engine.tick(1.0 / 60.0)?;
//! for mix in engine.render()? {
//!     backend.apply(&mix);
//! }
//! ```

pub mod buffer;
pub mod clock;
pub mod emotion;
pub mod engine;
pub mod environment;
pub mod events;
pub mod governor;
pub mod interaction;
pub mod layer;
pub mod mixer;
pub mod ramp;
pub mod spatial;
pub mod story;

pub use buffer::{AudioBuffer, AudioResource, BufferCache, BufferDecoder, DefaultDecoder};
pub use clock::{ScheduleKey, Scheduler, SegmentClock};
pub use emotion::{Emotion, EmotionTracker, EmotionalState};
pub use engine::{AudioEngine, AudioEngineConfig};
pub use environment::{
    AcousticsConfig, EchoParams, EnvironmentKind, EnvironmentProfile, ImpulseSource, ReverbBus,
    ReverbCategory, SubmersionOverlay, SyntheticImpulse,
};
pub use events::{EventBus, EventStream};
pub use governor::{
    AdaptiveSettings, BatteryStatus, CapabilityFlags, CapabilityProbe, DeviceCapabilities,
    GovernorConfig, OptimizationProfile, OptimizationReason, OptimizationUpdate, PerformanceGovernor,
    PerformanceMetrics, ProcessingTier, RecommendedAudioSettings,
};
pub use interaction::{InteractionEvent, InteractionHistory, InteractionKind};
pub use layer::{AdaptiveResponse, AudioLayer, LayerState};
pub use mixer::{LayerMixer, MixerConfig, MixerEvent};
pub use ramp::{FadeCurve, Ramp, Vec3Ramp};
pub use spatial::{
    ConeParams, DistanceModel, DistanceParams, EmitterMix, EmitterOptions, ListenerState, Medium,
    PlaybackState, SoundEmitter, SpatialEvent, SpatialField,
};
pub use story::{
    AdaptiveTrigger, AudioCue, CueAction, CueGuard, MomentContext, StoryMoment, TriggerCondition,
    TriggerResponse,
};

/// Error types for the audio crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Audio resource could not be loaded: {0}")]
    Resource(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Unknown {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Platform capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio engine is not initialized")]
    NotInitialized,
}

impl Error {
    pub(crate) fn emitter(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "emitter",
            id: id.into(),
        }
    }

    pub(crate) fn layer(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "layer",
            id: id.into(),
        }
    }

    /// Returns true if the failure is contained to one emitter/layer and the
    /// mixing loop should simply carry on
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Error::Resource(_) | Error::CapabilityUnavailable(_) | Error::NotFound { .. }
        )
    }
}

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Volume level (0.0 = silent, 1.0 = full volume)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Volume(f32);

impl Volume {
    /// Silent (0.0)
    pub const SILENT: Self = Self(0.0);
    /// Full volume (1.0)
    pub const FULL: Self = Self(1.0);

    /// Create a new volume level, clamped to [0.0, 1.0]
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::SILENT;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Get the volume value
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Whether anything can be heard at this level
    pub fn is_audible(&self) -> bool {
        self.0 > f32::EPSILON
    }

    /// Convert to decibels (useful for audio mixing)
    pub fn to_db(&self) -> f32 {
        if self.0 <= 0.0 {
            f32::NEG_INFINITY
        } else {
            20.0 * self.0.log10()
        }
    }

    /// Create from decibel value
    pub fn from_db(db: f32) -> Self {
        Self::new(10.0_f32.powf(db / 20.0))
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::FULL
    }
}

impl From<f32> for Volume {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

/// Logical layer categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioCategory {
    /// Score and themes
    Music,
    /// Ocean, wind, harbour beds
    Ambience,
    /// Narration and character voices
    Voice,
    /// One-shots and interaction feedback
    #[default]
    Effects,
    /// Whale calls, clicks, breaths
    CreatureSounds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_clamping() {
        assert_eq!(Volume::new(-0.5).value(), 0.0);
        assert_eq!(Volume::new(0.5).value(), 0.5);
        assert_eq!(Volume::new(1.5).value(), 1.0);
        assert_eq!(Volume::new(f32::NAN).value(), 0.0);
    }

    #[test]
    fn volume_db_conversion() {
        let vol = Volume::new(1.0);
        assert!((vol.to_db() - 0.0).abs() < 0.001);

        let vol = Volume::new(0.5);
        assert!((vol.to_db() - (-6.02)).abs() < 0.1);

        let reconstructed = Volume::from_db(-6.02);
        assert!((reconstructed.value() - 0.5).abs() < 0.01);
    }

    #[test]
    fn category_names_are_kebab_case() {
        #[derive(serde::Deserialize)]
        struct Wrap {
            category: AudioCategory,
        }
        let parsed: Wrap = toml::from_str("category = \"creature-sounds\"").unwrap();
        assert_eq!(parsed.category, AudioCategory::CreatureSounds);
    }

    #[test]
    fn contained_errors() {
        assert!(Error::Resource("x".into()).is_contained());
        assert!(Error::emitter("ghost").is_contained());
        assert!(!Error::NotInitialized.is_contained());
    }
}
