//! Core audio engine implementation
//!
//! The AudioEngine is the explicitly owned entry point for all audio
//! operations. It has a defined lifecycle (`init()` / `dispose()`), owns the
//! spatial field, layer mixer, performance governor and reverb bus, and
//! applies master and per-category volumes on top of the field's render.

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    emotion::EmotionalState,
    environment::{AcousticsConfig, EnvironmentKind, ImpulseSource, ReverbBus, SubmersionOverlay},
    governor::{BatteryStatus, CapabilityProbe, GovernorConfig, PerformanceGovernor},
    interaction::InteractionEvent,
    mixer::{LayerMixer, MixerConfig},
    spatial::{EmitterMix, SpatialField},
    story::StoryMoment,
    AudioCategory, Error, Result, Volume,
};

/// Configuration for the audio engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEngineConfig {
    /// Master volume
    pub master_volume: Volume,
    /// Per-category volume settings
    pub category_volumes: HashMap<AudioCategory, Volume>,
    /// Environment selected at init
    pub environment: EnvironmentKind,
    pub acoustics: AcousticsConfig,
    pub mixer: MixerConfig,
    pub governor: GovernorConfig,
}

impl Default for AudioEngineConfig {
    fn default() -> Self {
        let mut category_volumes = HashMap::new();
        category_volumes.insert(AudioCategory::Music, Volume::new(0.7));
        category_volumes.insert(AudioCategory::Ambience, Volume::new(0.6));
        category_volumes.insert(AudioCategory::Voice, Volume::FULL);
        category_volumes.insert(AudioCategory::Effects, Volume::new(0.8));
        category_volumes.insert(AudioCategory::CreatureSounds, Volume::new(0.9));

        Self {
            master_volume: Volume::FULL,
            category_volumes,
            environment: EnvironmentKind::Surface,
            acoustics: AcousticsConfig::default(),
            mixer: MixerConfig::default(),
            governor: GovernorConfig::default(),
        }
    }
}

/// Subsystems that only exist between `init()` and `dispose()`
#[derive(Debug)]
struct Subsystems {
    field: SpatialField,
    mixer: LayerMixer,
    governor: PerformanceGovernor,
    reverb: ReverbBus,
}

/// The main audio engine
#[derive(Debug)]
pub struct AudioEngine {
    /// Engine configuration
    config: AudioEngineConfig,
    /// Present while initialized
    systems: Option<Subsystems>,
    /// Engine time in seconds
    now: f64,
}

impl AudioEngine {
    /// Create an uninitialized engine
    pub fn new(config: AudioEngineConfig) -> Self {
        Self {
            config,
            systems: None,
            now: 0.0,
        }
    }

    /// Build the subsystems; detection failures fall back to safe defaults
    ///
    /// Calling `init` on an initialized engine is a no-op.
    pub fn init(&mut self, probe: &dyn CapabilityProbe) -> Result<()> {
        if self.systems.is_some() {
            return Ok(());
        }
        info!("Initializing audio engine");

        let governor = PerformanceGovernor::detect(self.config.governor.clone(), probe);
        let mut field = SpatialField::new(self.config.acoustics.clone());
        let profile = field.set_environment(self.config.environment).clone();
        let mut reverb = ReverbBus::new();
        reverb.apply_profile(&profile);

        let mixer = LayerMixer::new(self.config.mixer.clone());
        self.systems = Some(Subsystems {
            field,
            mixer,
            governor,
            reverb,
        });
        self.apply_governor();
        Ok(())
    }

    /// Check if the engine is initialized
    pub fn is_initialized(&self) -> bool {
        self.systems.is_some()
    }

    /// Error unless `init` has run
    pub fn ensure_initialized(&self) -> Result<()> {
        self.systems.as_ref().map(|_| ()).ok_or(Error::NotInitialized)
    }

    /// Stop everything and release the subsystems
    pub fn dispose(&mut self) {
        if let Some(mut systems) = self.systems.take() {
            info!("Shutting down audio engine");
            systems.field.clear();
        }
    }

    fn systems(&self) -> Result<&Subsystems> {
        self.systems.as_ref().ok_or(Error::NotInitialized)
    }

    fn systems_mut(&mut self) -> Result<&mut Subsystems> {
        self.systems.as_mut().ok_or(Error::NotInitialized)
    }

    pub fn field(&self) -> Result<&SpatialField> {
        Ok(&self.systems()?.field)
    }

    pub fn field_mut(&mut self) -> Result<&mut SpatialField> {
        Ok(&mut self.systems_mut()?.field)
    }

    pub fn mixer(&self) -> Result<&LayerMixer> {
        Ok(&self.systems()?.mixer)
    }

    pub fn mixer_mut(&mut self) -> Result<&mut LayerMixer> {
        Ok(&mut self.systems_mut()?.mixer)
    }

    pub fn governor(&self) -> Result<&PerformanceGovernor> {
        Ok(&self.systems()?.governor)
    }

    pub fn governor_mut(&mut self) -> Result<&mut PerformanceGovernor> {
        Ok(&mut self.systems_mut()?.governor)
    }

    pub fn reverb(&self) -> Result<&ReverbBus> {
        Ok(&self.systems()?.reverb)
    }

    /// Engine time in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    // -------------------------------------------------------------------------
    // Volume Control
    // -------------------------------------------------------------------------

    /// Set the master volume
    pub fn set_master_volume(&mut self, volume: Volume) {
        self.config.master_volume = volume;
        debug!("Master volume set to {}", volume.value());
    }

    /// Get the master volume
    pub fn master_volume(&self) -> Volume {
        self.config.master_volume
    }

    /// Set volume for a specific category
    pub fn set_category_volume(&mut self, category: AudioCategory, volume: Volume) {
        self.config.category_volumes.insert(category, volume);
        debug!("Category {:?} volume set to {}", category, volume.value());
    }

    /// Get volume for a specific category
    pub fn category_volume(&self, category: AudioCategory) -> Volume {
        self.config
            .category_volumes
            .get(&category)
            .copied()
            .unwrap_or(Volume::FULL)
    }

    /// Calculate effective volume for a category (master * category)
    pub fn effective_volume(&self, category: AudioCategory) -> Volume {
        let master = self.config.master_volume.value();
        let category_vol = self.category_volume(category).value();
        Volume::new(master * category_vol)
    }

    // -------------------------------------------------------------------------
    // Acoustics
    // -------------------------------------------------------------------------

    /// Switch environment; returns true when a new reverb impulse is needed
    pub fn set_environment(&mut self, kind: EnvironmentKind) -> Result<bool> {
        let systems = self.systems_mut()?;
        let profile = systems.field.set_environment(kind).clone();
        Ok(systems.reverb.apply_profile(&profile))
    }

    /// Load the impulse for the current reverb category
    ///
    /// Failure disables reverb; playback continues either way.
    pub async fn load_reverb(&mut self, source: &dyn ImpulseSource) -> Result<()> {
        let systems = self.systems_mut()?;
        systems.reverb.load_impulse(source).await;
        let allowed = systems.governor.recommended_audio_settings().reverb_enabled;
        systems.reverb.set_enabled(allowed);
        Ok(())
    }

    pub fn set_submerged(&mut self, enabled: bool, depth: f32, overlay: SubmersionOverlay) -> Result<()> {
        self.field_mut()?.set_submerged(enabled, depth, overlay);
        Ok(())
    }

    pub fn update_listener(
        &mut self,
        position: Option<Vec3>,
        forward: Option<Vec3>,
        up: Option<Vec3>,
        velocity: Option<Vec3>,
    ) -> Result<()> {
        self.field_mut()?
            .update_listener(position, forward, up, velocity);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mixing signals
    // -------------------------------------------------------------------------

    pub fn update_emotional_state(&mut self, state: EmotionalState) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.update_emotional_state(field, state);
        Ok(())
    }

    pub fn handle_interaction(&mut self, event: InteractionEvent) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.handle_interaction(field, event);
        Ok(())
    }

    pub fn start_story_moment(&mut self, moment: StoryMoment) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.start_story_moment(field, moment);
        Ok(())
    }

    pub fn play_layer(&mut self, id: &str) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.play_layer(field, id)
    }

    pub fn stop_layer(&mut self, id: &str) -> Result<()> {
        self.mixer_mut()?.stop_layer(id)
    }

    pub fn crossfade_layers(&mut self, from: &str, to: &str, duration: f32) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.crossfade_layers(field, from, to, duration)
    }

    /// Silence all layers immediately
    pub fn emergency_stop(&mut self) -> Result<()> {
        let Subsystems { field, mixer, .. } = self.systems_mut()?;
        mixer.emergency_stop(field);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Governor inputs
    // -------------------------------------------------------------------------

    pub fn report_battery(&mut self, status: BatteryStatus) -> Result<()> {
        self.governor_mut()?.report_battery(status);
        self.apply_governor();
        Ok(())
    }

    pub fn set_background(&mut self, background: bool) -> Result<()> {
        let now = self.now;
        self.governor_mut()?.set_background(background, now);
        self.apply_governor();
        Ok(())
    }

    fn apply_governor(&mut self) {
        let Some(systems) = self.systems.as_mut() else {
            return;
        };
        let recommended = systems.governor.recommended_audio_settings();
        systems.field.set_max_sources(recommended.max_spatial_sources);
        systems.reverb.set_enabled(recommended.reverb_enabled);
        systems
            .mixer
            .set_realtime(systems.governor.settings().realtime_processing);
    }

    // -------------------------------------------------------------------------
    // Engine Update
    // -------------------------------------------------------------------------

    /// Advance every subsystem by one frame
    pub fn tick(&mut self, delta_time: f32) -> Result<()> {
        self.ensure_initialized()?;
        self.now += f64::from(delta_time.max(0.0));
        let now = self.now;

        if let Some(systems) = self.systems.as_mut() {
            systems.governor.record_frame(now);
            systems.governor.tick(now);
            systems.governor.check_optimization_needed(now);
        }
        self.apply_governor();

        let Subsystems {
            field,
            mixer,
            reverb,
            ..
        } = self.systems_mut()?;
        mixer.tick(field, delta_time);
        if let Some(wet) = mixer.take_reverb_request() {
            reverb.set_wet(wet);
        }
        field.tick(delta_time);
        Ok(())
    }

    /// Final per-emitter parameters with master and category volumes applied
    pub fn render(&self) -> Result<Vec<EmitterMix>> {
        let systems = self.systems()?;
        let mut mixes = systems.field.render();
        for mix in &mut mixes {
            let category = systems
                .mixer
                .layer(&mix.layer)
                .map(|ch| ch.layer().category)
                .unwrap_or_default();
            mix.gain = (mix.gain * self.effective_volume(category).value()).clamp(0.0, 1.0);
        }
        Ok(mixes)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.is_initialized() {
            self.dispose();
        }
    }
}
