//! Effect, scene and soundscape registry
//!
//! Content refers to visuals and ambience by tag. Every tag is a closed enum
//! variant mapped to a typed parameter record here, so an unknown tag fails
//! when content is deserialized instead of being guessed at during playback.

use glam::Vec3;
use oldtom_audio::{AudioCategory, EnvironmentKind};
use serde::{Deserialize, Serialize};

/// Visual effect a segment can call for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectTag {
    Splash,
    Bubbles,
    /// Whale blow
    Spout,
    Mist,
    Lightning,
    Bioluminescence,
    Sunrise,
    Stars,
    Ripples,
    Rain,
}

/// Parameters handed to the renderer with an effect trigger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    /// 0.0 to 1.0
    pub intensity: f32,
    /// Seconds
    pub duration: f32,
    pub particles: u32,
    /// Linear RGB
    pub color: [f32; 3],
}

impl EffectTag {
    pub const ALL: [EffectTag; 10] = [
        EffectTag::Splash,
        EffectTag::Bubbles,
        EffectTag::Spout,
        EffectTag::Mist,
        EffectTag::Lightning,
        EffectTag::Bioluminescence,
        EffectTag::Sunrise,
        EffectTag::Stars,
        EffectTag::Ripples,
        EffectTag::Rain,
    ];

    pub fn params(&self) -> EffectParams {
        let (intensity, duration, particles, color) = match self {
            EffectTag::Splash => (0.9, 1.5, 400, [0.85, 0.93, 1.0]),
            EffectTag::Bubbles => (0.5, 4.0, 150, [0.8, 0.9, 1.0]),
            EffectTag::Spout => (0.8, 2.5, 600, [0.95, 0.97, 1.0]),
            EffectTag::Mist => (0.3, 8.0, 80, [0.9, 0.9, 0.92]),
            EffectTag::Lightning => (1.0, 0.4, 0, [0.9, 0.9, 1.0]),
            EffectTag::Bioluminescence => (0.6, 6.0, 300, [0.2, 0.8, 0.9]),
            EffectTag::Sunrise => (0.4, 10.0, 0, [1.0, 0.7, 0.4]),
            EffectTag::Stars => (0.3, 12.0, 500, [1.0, 1.0, 0.95]),
            EffectTag::Ripples => (0.4, 3.0, 40, [0.7, 0.85, 0.95]),
            EffectTag::Rain => (0.7, 10.0, 1200, [0.75, 0.8, 0.9]),
        };
        EffectParams {
            intensity,
            duration,
            particles,
            color,
        }
    }
}

/// Camera placement for a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
}

impl CameraPose {
    /// Move `fraction` of the way toward the target
    pub fn pushed_in(&self, fraction: f32) -> Self {
        Self {
            position: self.position.lerp(self.target, fraction.clamp(0.0, 0.9)),
            ..*self
        }
    }

    /// Move away from the target by `fraction` of the current distance
    pub fn pulled_back(&self, fraction: f32) -> Self {
        let offset = self.position - self.target;
        Self {
            position: self.target + offset * (1.0 + fraction.max(0.0)),
            ..*self
        }
    }
}

/// Where a segment takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SceneTag {
    TwofoldBay,
    OpenOcean,
    Underwater,
    DeepOcean,
    WhalingStation,
    Whaleboat,
    Shore,
    Storm,
    Night,
}

impl SceneTag {
    /// Opening camera preset
    pub fn camera(&self) -> CameraPose {
        let (position, target, fov) = match self {
            SceneTag::TwofoldBay => (Vec3::new(0.0, 6.0, 18.0), Vec3::ZERO, 55.0),
            SceneTag::OpenOcean => (Vec3::new(0.0, 4.0, 30.0), Vec3::ZERO, 60.0),
            SceneTag::Underwater => (Vec3::new(0.0, -3.0, 10.0), Vec3::new(0.0, -4.0, 0.0), 65.0),
            SceneTag::DeepOcean => (Vec3::new(0.0, -20.0, 12.0), Vec3::new(0.0, -25.0, 0.0), 70.0),
            SceneTag::WhalingStation => (Vec3::new(-8.0, 10.0, 20.0), Vec3::new(0.0, 2.0, 0.0), 50.0),
            SceneTag::Whaleboat => (Vec3::new(0.0, 2.0, 6.0), Vec3::new(0.0, 1.0, 0.0), 60.0),
            SceneTag::Shore => (Vec3::new(5.0, 3.0, 12.0), Vec3::ZERO, 55.0),
            SceneTag::Storm => (Vec3::new(0.0, 8.0, 25.0), Vec3::ZERO, 70.0),
            SceneTag::Night => (Vec3::new(0.0, 5.0, 20.0), Vec3::new(0.0, 3.0, 0.0), 50.0),
        };
        CameraPose {
            position,
            target,
            fov,
        }
    }

    /// Acoustic space of the scene
    pub fn environment(&self) -> EnvironmentKind {
        match self {
            SceneTag::TwofoldBay | SceneTag::Night => EnvironmentKind::Surface,
            SceneTag::OpenOcean => EnvironmentKind::OpenOcean,
            SceneTag::Underwater => EnvironmentKind::Underwater,
            SceneTag::DeepOcean => EnvironmentKind::DeepOcean,
            SceneTag::WhalingStation => EnvironmentKind::Harbor,
            SceneTag::Whaleboat => EnvironmentKind::VesselInterior,
            SceneTag::Shore => EnvironmentKind::Coastal,
            SceneTag::Storm => EnvironmentKind::Storm,
        }
    }

    /// Soundscape used when a segment declares none
    pub fn default_soundscape(&self) -> &'static [SoundscapeTag] {
        match self {
            SceneTag::TwofoldBay => &[SoundscapeTag::Waves, SoundscapeTag::Gulls],
            SceneTag::OpenOcean => &[SoundscapeTag::Waves, SoundscapeTag::Wind],
            SceneTag::Underwater | SceneTag::DeepOcean => {
                &[SoundscapeTag::UnderwaterDrone, SoundscapeTag::WhaleSong]
            }
            SceneTag::WhalingStation => &[SoundscapeTag::HarbourBustle, SoundscapeTag::Waves],
            SceneTag::Whaleboat => &[SoundscapeTag::Waves],
            SceneTag::Shore => &[SoundscapeTag::Waves, SoundscapeTag::Gulls],
            SceneTag::Storm => &[SoundscapeTag::Rain, SoundscapeTag::Thunder],
            SceneTag::Night => &[SoundscapeTag::Waves, SoundscapeTag::Lullaby],
        }
    }
}

/// Background ambience or music a segment can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoundscapeTag {
    Waves,
    Wind,
    Gulls,
    WhaleSong,
    Rain,
    Thunder,
    HarbourBustle,
    UnderwaterDrone,
    AdventureTheme,
    Lullaby,
    MysteryTheme,
}

/// How a background track is loaded and placed
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub tag: SoundscapeTag,
    pub id: String,
    pub category: AudioCategory,
    pub volume: f32,
    pub looping: bool,
    /// Spatial tracks are placed in the field; others play flat
    pub position: Option<Vec3>,
    pub max_distance: f32,
    /// Fundamental used by synthesized stand-ins (Hz)
    pub tone_hz: f32,
}

impl SoundscapeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundscapeTag::Waves => "waves",
            SoundscapeTag::Wind => "wind",
            SoundscapeTag::Gulls => "gulls",
            SoundscapeTag::WhaleSong => "whale-song",
            SoundscapeTag::Rain => "rain",
            SoundscapeTag::Thunder => "thunder",
            SoundscapeTag::HarbourBustle => "harbour-bustle",
            SoundscapeTag::UnderwaterDrone => "underwater-drone",
            SoundscapeTag::AdventureTheme => "adventure-theme",
            SoundscapeTag::Lullaby => "lullaby",
            SoundscapeTag::MysteryTheme => "mystery-theme",
        }
    }

    pub fn is_music(&self) -> bool {
        matches!(
            self,
            SoundscapeTag::AdventureTheme | SoundscapeTag::Lullaby | SoundscapeTag::MysteryTheme
        )
    }

    pub fn track(&self) -> TrackDescriptor {
        let (volume, position, tone_hz) = match self {
            SoundscapeTag::Waves => (0.5, None, 110.0),
            SoundscapeTag::Wind => (0.3, None, 180.0),
            SoundscapeTag::Gulls => (0.25, Some(Vec3::new(-6.0, 8.0, -10.0)), 1_600.0),
            SoundscapeTag::WhaleSong => (0.45, Some(Vec3::new(12.0, -5.0, -20.0)), 220.0),
            SoundscapeTag::Rain => (0.4, None, 2_400.0),
            SoundscapeTag::Thunder => (0.6, Some(Vec3::new(0.0, 40.0, -60.0)), 55.0),
            SoundscapeTag::HarbourBustle => (0.3, Some(Vec3::new(8.0, 0.0, -6.0)), 330.0),
            SoundscapeTag::UnderwaterDrone => (0.4, None, 70.0),
            SoundscapeTag::AdventureTheme => (0.35, None, 293.66),
            SoundscapeTag::Lullaby => (0.3, None, 261.63),
            SoundscapeTag::MysteryTheme => (0.3, None, 233.08),
        };
        TrackDescriptor {
            tag: *self,
            id: self.as_str().to_string(),
            category: if self.is_music() {
                AudioCategory::Music
            } else {
                AudioCategory::Ambience
            },
            volume,
            looping: true,
            position,
            max_distance: if position.is_some() { 80.0 } else { 0.0 },
            tone_hz,
        }
    }
}
