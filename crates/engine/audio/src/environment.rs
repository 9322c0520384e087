//! Environment acoustics
//!
//! Named, immutable parameter bundles that translate a narrative place
//! (open ocean, whaling boat, beneath the surface of Twofold Bay) into DSP
//! settings, plus the submersion overlay used when the listener is underwater.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::AudioBuffer;
use crate::Result;

/// Narrative spaces with their own acoustic character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentKind {
    /// Calm water surface, open sky
    #[default]
    Surface,
    /// Far from shore, wind and swell
    OpenOcean,
    /// Just below the surface
    Underwater,
    /// Deep water, long dark reverberation
    DeepOcean,
    /// Shoreline, cliffs returning echoes
    Coastal,
    /// Harbour and whaling station
    Harbor,
    /// Inside a boat hull or cabin
    VesselInterior,
    /// Storm at sea
    Storm,
}

impl EnvironmentKind {
    /// All kinds, in declaration order
    pub const ALL: [EnvironmentKind; 8] = [
        EnvironmentKind::Surface,
        EnvironmentKind::OpenOcean,
        EnvironmentKind::Underwater,
        EnvironmentKind::DeepOcean,
        EnvironmentKind::Coastal,
        EnvironmentKind::Harbor,
        EnvironmentKind::VesselInterior,
        EnvironmentKind::Storm,
    ];

    /// Parse a content tag, falling back to [`EnvironmentKind::Surface`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "open-ocean" | "ocean" => EnvironmentKind::OpenOcean,
            "underwater" => EnvironmentKind::Underwater,
            "deep-ocean" | "deep" => EnvironmentKind::DeepOcean,
            "coastal" | "coast" | "shore" => EnvironmentKind::Coastal,
            "harbor" | "harbour" | "station" => EnvironmentKind::Harbor,
            "vessel-interior" | "vessel" | "boat" | "cabin" => EnvironmentKind::VesselInterior,
            "storm" => EnvironmentKind::Storm,
            _ => EnvironmentKind::Surface,
        }
    }

    /// Whether this space is below the waterline
    pub fn is_submerged(&self) -> bool {
        matches!(self, EnvironmentKind::Underwater | EnvironmentKind::DeepOcean)
    }

    pub fn profile(&self) -> EnvironmentProfile {
        EnvironmentProfile::for_kind(*self)
    }
}

/// Reverb character, used to pick an impulse response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReverbCategory {
    /// No reverb stage
    Dry,
    /// Short, diffuse outdoor tail
    #[default]
    Open,
    /// Tight wooden reflections
    Enclosed,
    /// Dense, dark and long
    Underwater,
    /// Very long, very dark
    Abyssal,
}

impl ReverbCategory {
    /// Tail length in seconds for synthetic impulses
    pub const fn decay_seconds(&self) -> f32 {
        match self {
            ReverbCategory::Dry => 0.0,
            ReverbCategory::Open => 0.8,
            ReverbCategory::Enclosed => 0.4,
            ReverbCategory::Underwater => 2.2,
            ReverbCategory::Abyssal => 4.0,
        }
    }
}

/// Discrete echo (cliff return, hull slap)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EchoParams {
    /// Delay before the echo in seconds
    pub delay: f32,
    /// Feedback per repeat (0.0 to 1.0)
    pub decay: f32,
}

/// Acoustic preset for a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub kind: EnvironmentKind,
    pub reverb: ReverbCategory,
    /// Reverb wet/dry mix (0.0 to 1.0)
    pub reverb_wet: f32,
    /// High-frequency damping (0.0 to 1.0)
    pub dampening: f32,
    pub echo: Option<EchoParams>,
    /// Low-pass cutoff in Hz
    pub lowpass_hz: f32,
    /// High-pass cutoff in Hz
    pub highpass_hz: f32,
    /// Bus compressor ratio
    pub compression_ratio: f32,
    /// Multiplier on how quickly sound thins out with distance
    pub atmospheric_density: f32,
    /// Multiplier applied to every emitter's rolloff factor
    pub rolloff_scale: f32,
    /// Multiplier applied to every emitter's reference distance
    pub reference_scale: f32,
    /// Overall gain of the space
    pub gain: f32,
}

impl EnvironmentProfile {
    /// Look up the preset for a space
    pub fn for_kind(kind: EnvironmentKind) -> Self {
        let base = Self {
            kind,
            reverb: ReverbCategory::Open,
            reverb_wet: 0.1,
            dampening: 0.1,
            echo: None,
            lowpass_hz: 20_000.0,
            highpass_hz: 20.0,
            compression_ratio: 2.0,
            atmospheric_density: 1.0,
            rolloff_scale: 1.0,
            reference_scale: 1.0,
            gain: 1.0,
        };

        match kind {
            EnvironmentKind::Surface => base,
            EnvironmentKind::OpenOcean => Self {
                reverb_wet: 0.05,
                dampening: 0.2,
                lowpass_hz: 16_000.0,
                compression_ratio: 3.0,
                atmospheric_density: 1.2,
                rolloff_scale: 0.8,
                reference_scale: 1.5,
                ..base
            },
            EnvironmentKind::Underwater => Self {
                reverb: ReverbCategory::Underwater,
                reverb_wet: 0.35,
                dampening: 0.7,
                lowpass_hz: 1_200.0,
                highpass_hz: 60.0,
                compression_ratio: 4.0,
                atmospheric_density: 0.6,
                rolloff_scale: 0.5,
                reference_scale: 2.0,
                gain: 0.85,
                ..base
            },
            EnvironmentKind::DeepOcean => Self {
                reverb: ReverbCategory::Abyssal,
                reverb_wet: 0.5,
                dampening: 0.85,
                lowpass_hz: 600.0,
                highpass_hz: 40.0,
                compression_ratio: 5.0,
                atmospheric_density: 0.4,
                rolloff_scale: 0.4,
                reference_scale: 3.0,
                gain: 0.75,
                ..base
            },
            EnvironmentKind::Coastal => Self {
                reverb_wet: 0.2,
                dampening: 0.25,
                echo: Some(EchoParams {
                    delay: 0.35,
                    decay: 0.3,
                }),
                lowpass_hz: 14_000.0,
                ..base
            },
            EnvironmentKind::Harbor => Self {
                reverb_wet: 0.25,
                dampening: 0.3,
                echo: Some(EchoParams {
                    delay: 0.2,
                    decay: 0.25,
                }),
                lowpass_hz: 12_000.0,
                rolloff_scale: 1.2,
                ..base
            },
            EnvironmentKind::VesselInterior => Self {
                reverb: ReverbCategory::Enclosed,
                reverb_wet: 0.4,
                dampening: 0.5,
                lowpass_hz: 6_000.0,
                highpass_hz: 80.0,
                compression_ratio: 2.5,
                rolloff_scale: 2.0,
                reference_scale: 0.5,
                ..base
            },
            EnvironmentKind::Storm => Self {
                reverb: ReverbCategory::Open,
                reverb_wet: 0.15,
                dampening: 0.4,
                lowpass_hz: 10_000.0,
                highpass_hz: 40.0,
                compression_ratio: 6.0,
                atmospheric_density: 1.6,
                rolloff_scale: 1.5,
                gain: 0.9,
                ..base
            },
        }
    }

    /// Preset for a free-text content tag (unknown tags resolve to the surface)
    pub fn for_name(name: &str) -> Self {
        Self::for_kind(EnvironmentKind::from_name(name))
    }
}

impl Default for EnvironmentProfile {
    fn default() -> Self {
        Self::for_kind(EnvironmentKind::Surface)
    }
}

/// Tunable constants for the acoustic model
///
/// The underwater terms are perceptual approximations, not physics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcousticsConfig {
    /// Speed of sound in air (units per second)
    pub air_sound_speed: f32,
    /// Minimum |rate - 1| before a Doppler change is applied
    pub doppler_threshold: f32,
    /// Interpolation window for position updates (seconds)
    pub position_ramp: f32,
    /// Underwater absorption constant k in exp(-distance * depth * k)
    pub absorption_k: f32,
    /// Gain lost per extra atmosphere of pressure
    pub pressure_coefficient: f32,
    /// Listener y below this value counts as submerged
    pub surface_level: f32,
    /// Low-pass applied to everything while submerged (Hz)
    pub underwater_lowpass_hz: f32,
    /// Extra gain factor while bubbles are present
    pub bubble_attenuation: f32,
    /// Gain of a submerged source heard from above the surface
    pub through_surface_gain: f32,
    /// Low-pass of a submerged source heard from above (Hz)
    pub through_surface_lowpass_hz: f32,
    /// Reference distance multiplier while submerged
    pub submerged_reference_scale: f32,
    /// Rolloff multiplier while submerged
    pub submerged_rolloff_scale: f32,
}

impl Default for AcousticsConfig {
    fn default() -> Self {
        Self {
            air_sound_speed: 343.0,
            doppler_threshold: 0.01,
            position_ramp: 0.1,
            absorption_k: 0.0005,
            pressure_coefficient: 0.1,
            surface_level: 0.0,
            underwater_lowpass_hz: 1_500.0,
            bubble_attenuation: 0.85,
            through_surface_gain: 0.3,
            through_surface_lowpass_hz: 500.0,
            submerged_reference_scale: 2.0,
            submerged_rolloff_scale: 0.5,
        }
    }
}

/// Extra acoustic state while the listener is underwater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmersionOverlay {
    pub enabled: bool,
    /// Depth below the surface in metres
    pub depth: f32,
    /// Practical salinity units
    pub salinity: f32,
    /// Water temperature in degrees Celsius
    pub temperature: f32,
    /// Water current (drifts emitters in the mixer)
    pub current: glam::Vec3,
    pub bubbles: bool,
    pub thermal_layers: bool,
}

impl Default for SubmersionOverlay {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: 0.0,
            salinity: 35.0,
            temperature: 18.0,
            current: glam::Vec3::ZERO,
            bubbles: false,
            thermal_layers: false,
        }
    }
}

impl SubmersionOverlay {
    /// Speed of sound in sea water (simplified Mackenzie approximation)
    pub fn sound_speed(&self) -> f32 {
        let t = self.temperature;
        let s = self.salinity;
        let d = self.depth.max(0.0);
        1448.96 + 4.591 * t - 0.05304 * t * t + 0.0002374 * t * t * t
            + 1.34 * (s - 35.0)
            + 0.0163 * d
    }

    /// Hydrostatic pressure in atmospheres (1 at the surface)
    pub fn pressure(&self) -> f32 {
        1.0 + self.depth.max(0.0) / 10.0
    }

    /// Gain factor from pressure
    pub fn pressure_gain(&self, config: &AcousticsConfig) -> f32 {
        1.0 / (1.0 + (self.pressure() - 1.0) * config.pressure_coefficient.max(0.0))
    }

    /// exp(-distance * depth * k)
    pub fn absorption_gain(&self, distance: f32, config: &AcousticsConfig) -> f32 {
        (-(distance.max(0.0)) * self.depth.max(0.0) * config.absorption_k.max(0.0)).exp()
    }

    /// Combined per-emitter gain at `distance`
    pub fn gain(&self, distance: f32, config: &AcousticsConfig) -> f32 {
        if !self.enabled {
            return 1.0;
        }
        let mut gain = self.absorption_gain(distance, config) * self.pressure_gain(config);
        if self.bubbles {
            gain *= config.bubble_attenuation;
        }
        gain.clamp(0.0, 1.0)
    }

    /// Low-pass cutoff while submerged
    pub fn lowpass_hz(&self, config: &AcousticsConfig) -> f32 {
        if self.thermal_layers {
            config.underwater_lowpass_hz * 0.5
        } else {
            config.underwater_lowpass_hz
        }
    }
}

/// Source of impulse responses for the convolution stage
#[async_trait]
pub trait ImpulseSource: Send + Sync {
    async fn load(&self, category: ReverbCategory) -> Result<Arc<AudioBuffer>>;
}

/// Generates decaying-noise impulses, one per category
#[derive(Debug, Clone)]
pub struct SyntheticImpulse {
    pub sample_rate: u32,
    pub seed: u64,
}

impl Default for SyntheticImpulse {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            seed: 0x0_1d70,
        }
    }
}

impl SyntheticImpulse {
    pub fn generate(&self, category: ReverbCategory) -> AudioBuffer {
        let seconds = category.decay_seconds();
        let count = (seconds * self.sample_rate as f32) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed ^ category as u64);
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / count.max(1) as f32;
                rng.random_range(-1.0f32..1.0) * (1.0 - t).powi(3)
            })
            .collect();
        AudioBuffer::from_samples(format!("impulse:{category:?}"), samples, self.sample_rate, 1)
    }
}

#[async_trait]
impl ImpulseSource for SyntheticImpulse {
    async fn load(&self, category: ReverbCategory) -> Result<Arc<AudioBuffer>> {
        Ok(Arc::new(self.generate(category)))
    }
}

/// Convolution reverb stage on the master bus
#[derive(Debug, Clone, Default)]
pub struct ReverbBus {
    category: ReverbCategory,
    impulse: Option<Arc<AudioBuffer>>,
    wet: f32,
    enabled: bool,
}

impl ReverbBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take wet mix and category from a profile; returns true if the
    /// category changed and a new impulse is needed
    pub fn apply_profile(&mut self, profile: &EnvironmentProfile) -> bool {
        self.wet = profile.reverb_wet;
        let changed = self.category != profile.reverb || self.impulse.is_none();
        self.category = profile.reverb;
        changed
    }

    /// Load the impulse for the current category; failure disables reverb
    pub async fn load_impulse(&mut self, source: &dyn ImpulseSource) {
        if self.category == ReverbCategory::Dry {
            self.impulse = None;
            self.enabled = false;
            return;
        }
        match source.load(self.category).await {
            Ok(impulse) => {
                debug!("Loaded {:?} impulse ({:.2}s)", self.category, impulse.duration());
                self.impulse = Some(impulse);
                self.enabled = true;
            }
            Err(e) => {
                warn!("Reverb impulse for {:?} unavailable, reverb disabled: {}", self.category, e);
                self.impulse = None;
                self.enabled = false;
            }
        }
    }

    /// Turn the stage off without dropping the impulse (governor request)
    pub fn set_enabled(&mut self, enabled: bool) {
        let enabled = enabled && self.impulse.is_some();
        if enabled != self.enabled {
            info!("Reverb {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn category(&self) -> ReverbCategory {
        self.category
    }

    pub fn impulse(&self) -> Option<&Arc<AudioBuffer>> {
        self.impulse.as_ref()
    }

    /// Effective wet mix (0 when disabled)
    pub fn wet(&self) -> f32 {
        if self.enabled {
            self.wet
        } else {
            0.0
        }
    }

    /// Nudge the wet mix (layer reverb adaptation)
    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
