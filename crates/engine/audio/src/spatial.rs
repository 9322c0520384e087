//! 3D spatial audio field
//!
//! Places emitters around a single listener and works out, every tick, how
//! loud each one should be, where it sits in the stereo image, how fast it
//! plays (Doppler) and how muffled it is (environment and submersion).

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::buffer::{AudioBuffer, AudioResource, BufferCache};
use crate::environment::{AcousticsConfig, EnvironmentKind, EnvironmentProfile, SubmersionOverlay};
use crate::events::{EventBus, EventStream};
use crate::ramp::Vec3Ramp;
use crate::{Error, Result};

/// Distance attenuation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceModel {
    /// No distance attenuation
    None,
    /// Linear attenuation: 1 - rolloff * (distance - refDistance) / (maxDistance - refDistance)
    Linear,
    /// Inverse distance: refDistance / (refDistance + rolloff * (distance - refDistance))
    #[default]
    Inverse,
    /// Exponential: (distance / refDistance) ^ -rolloff
    Exponential,
}

/// Distance attenuation parameters of one emitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceParams {
    pub model: DistanceModel,
    /// At this distance, volume is unchanged
    pub ref_distance: f32,
    /// Linear model reaches its floor here
    pub max_distance: f32,
    /// Higher = faster attenuation
    pub rolloff_factor: f32,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            model: DistanceModel::Inverse,
            ref_distance: 1.0,
            max_distance: 100.0,
            rolloff_factor: 1.0,
        }
    }
}

impl DistanceParams {
    /// Calculate distance attenuation factor (0.0 to 1.0)
    ///
    /// Non-increasing in `distance` for every model.
    pub fn attenuation(&self, distance: f32) -> f32 {
        let ref_distance = self.ref_distance.max(f32::EPSILON);
        let max_distance = self.max_distance.max(ref_distance);
        let rolloff = self.rolloff_factor.max(0.0);
        let distance = distance.max(ref_distance);

        match self.model {
            DistanceModel::None => 1.0,
            DistanceModel::Linear => {
                let span = max_distance - ref_distance;
                if span <= f32::EPSILON {
                    return 1.0;
                }
                let clamped = distance.min(max_distance);
                1.0 - rolloff * (clamped - ref_distance) / span
            }
            DistanceModel::Inverse => {
                ref_distance / (ref_distance + rolloff * (distance - ref_distance))
            }
            DistanceModel::Exponential => (distance / ref_distance).powf(-rolloff),
        }
        .clamp(0.0, 1.0)
    }

    fn scaled(&self, reference_scale: f32, rolloff_scale: f32) -> Self {
        Self {
            ref_distance: self.ref_distance * reference_scale,
            max_distance: self.max_distance.max(self.ref_distance * reference_scale),
            rolloff_factor: self.rolloff_factor * rolloff_scale,
            ..*self
        }
    }
}

/// Directional cone of an emitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeParams {
    /// Full inner angle in degrees (full gain inside)
    pub inner_angle: f32,
    /// Full outer angle in degrees (outer gain beyond)
    pub outer_angle: f32,
    pub outer_gain: f32,
}

impl Default for ConeParams {
    fn default() -> Self {
        Self {
            inner_angle: 360.0,
            outer_angle: 360.0,
            outer_gain: 0.0,
        }
    }
}

impl ConeParams {
    /// Gain for a listener seen at `to_listener` from an emitter facing `orientation`
    pub fn gain(&self, orientation: Vec3, to_listener: Vec3) -> f32 {
        if self.inner_angle >= 360.0 && self.outer_angle >= 360.0 {
            return 1.0;
        }
        if orientation.length_squared() < 1e-6 || to_listener.length_squared() < 1e-6 {
            return 1.0;
        }
        let angle = orientation.angle_between(to_listener).to_degrees();
        let inner = self.inner_angle * 0.5;
        let outer = (self.outer_angle * 0.5).max(inner);
        if angle <= inner {
            1.0
        } else if angle >= outer {
            self.outer_gain
        } else {
            let t = (angle - inner) / (outer - inner);
            1.0 + (self.outer_gain - 1.0) * t
        }
    }
}

/// Medium an emitter sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Medium {
    #[default]
    Surface,
    Submerged,
    Enclosed,
}

/// Playback state of an emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Looping,
    Paused,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Looping)
    }
}

/// Options for [`SpatialField::create_emitter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterOptions {
    /// Owning layer id
    pub layer: String,
    /// Human-readable name (defaults to the id)
    pub name: Option<String>,
    /// Base volume (0.0 to 1.0)
    pub volume: f32,
    pub distance: DistanceParams,
    pub cone: ConeParams,
    /// Direction the cone points at
    pub orientation: Vec3,
    pub medium: Medium,
    pub looping: bool,
    /// Non-spatial emitters (narration) skip attenuation and panning
    pub spatial: bool,
    /// Forget the emitter as soon as a one-shot finishes
    pub auto_remove: bool,
}

impl EmitterOptions {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            name: None,
            volume: 1.0,
            distance: DistanceParams::default(),
            cone: ConeParams::default(),
            orientation: Vec3::NEG_Z,
            medium: Medium::Surface,
            looping: false,
            spatial: true,
            auto_remove: false,
        }
    }

    pub fn looping(layer: impl Into<String>) -> Self {
        Self {
            looping: true,
            ..Self::new(layer)
        }
    }

    pub fn one_shot(layer: impl Into<String>) -> Self {
        Self {
            auto_remove: true,
            ..Self::new(layer)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_distance(mut self, distance: DistanceParams) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_cone(mut self, cone: ConeParams, orientation: Vec3) -> Self {
        self.cone = cone;
        self.orientation = orientation;
        self
    }

    pub fn with_medium(mut self, medium: Medium) -> Self {
        self.medium = medium;
        self
    }

    /// Play straight into the mix without 3D placement
    pub fn non_spatial(mut self) -> Self {
        self.spatial = false;
        self
    }
}

/// Listener pose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenerState {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub velocity: Vec3,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            velocity: Vec3::ZERO,
        }
    }
}

impl ListenerState {
    /// Get the right direction
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Constant-power (left, right) gains for a source position
    pub fn calculate_panning(&self, source_position: Vec3) -> (f32, f32) {
        let to_source = source_position - self.position;
        if to_source.length_squared() < 0.001 {
            let centre = std::f32::consts::FRAC_1_SQRT_2;
            return (centre, centre);
        }

        let pan = to_source.normalize().dot(self.right());
        let angle = (pan + 1.0) * 0.25 * std::f32::consts::PI;
        (angle.cos(), angle.sin())
    }
}

/// A positioned, playable sound source
#[derive(Debug, Clone)]
pub struct SoundEmitter {
    id: String,
    name: String,
    layer: String,
    position: Vec3Ramp,
    velocity: Vec3,
    buffer: Arc<AudioBuffer>,
    state: PlaybackState,
    volume: f32,
    bus_gain: f32,
    distance: DistanceParams,
    original_distance: DistanceParams,
    cone: ConeParams,
    orientation: Vec3,
    medium: Medium,
    looping: bool,
    spatial: bool,
    auto_remove: bool,
    playback_rate: f32,
    head: f32,
    start_offset: f32,
    play_duration: Option<f32>,
    delay: f32,
    generation: u32,
}

impl SoundEmitter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning layer id
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Current (interpolated) position
    pub fn position(&self) -> Vec3 {
        self.position.value()
    }

    /// Position the emitter is ramping toward
    pub fn target_position(&self) -> Vec3 {
        self.position.target()
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Gain applied by the owning layer
    pub fn bus_gain(&self) -> f32 {
        self.bus_gain
    }

    /// Effective distance parameters (after environment/submersion)
    pub fn distance(&self) -> DistanceParams {
        self.distance
    }

    /// Distance parameters as created
    pub fn original_distance(&self) -> DistanceParams {
        self.original_distance
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    /// Doppler-adjusted playback rate
    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    /// Playback head in seconds
    pub fn head(&self) -> f32 {
        self.head
    }

    /// How many times the playback node has been (re)created
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn end_time(&self) -> f32 {
        let buffer_end = self.buffer.duration();
        match self.play_duration {
            Some(d) => (self.start_offset + d).min(buffer_end),
            None => buffer_end,
        }
    }
}

/// Notifications published by the field
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialEvent {
    Started { id: String, generation: u32 },
    Looped { id: String },
    Ended { id: String },
    Removed { id: String },
    EnvironmentChanged(EnvironmentKind),
    SubmersionChanged { enabled: bool, depth: f32 },
}

/// Per-tick render output of one audible emitter
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterMix {
    pub id: String,
    pub layer: String,
    /// Final linear gain (0.0 to 1.0)
    pub gain: f32,
    /// Constant-power (left, right)
    pub pan: (f32, f32),
    pub playback_rate: f32,
    pub lowpass_hz: f32,
    pub distance: f32,
}

/// The set of live emitters around one listener
#[derive(Debug)]
pub struct SpatialField {
    config: AcousticsConfig,
    listener: ListenerState,
    listener_position: Vec3Ramp,
    emitters: BTreeMap<String, SoundEmitter>,
    buffers: BufferCache,
    profile: EnvironmentProfile,
    submersion: SubmersionOverlay,
    sound_speed: f32,
    max_sources: usize,
    events: EventBus<SpatialEvent>,
}

impl SpatialField {
    pub fn new(config: AcousticsConfig) -> Self {
        Self::with_buffers(config, BufferCache::new())
    }

    pub fn with_buffers(config: AcousticsConfig, buffers: BufferCache) -> Self {
        let sound_speed = config.air_sound_speed;
        Self {
            config,
            listener: ListenerState::default(),
            listener_position: Vec3Ramp::new(Vec3::ZERO),
            emitters: BTreeMap::new(),
            buffers,
            profile: EnvironmentProfile::default(),
            submersion: SubmersionOverlay::default(),
            sound_speed,
            max_sources: usize::MAX,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &AcousticsConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventStream<SpatialEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Emitter lifecycle
    // -------------------------------------------------------------------------

    /// Decode `resource` and register a new idle emitter
    pub fn create_emitter(
        &mut self,
        id: impl Into<String>,
        resource: &AudioResource,
        position: Vec3,
        options: EmitterOptions,
    ) -> Result<()> {
        let id = id.into();
        if self.emitters.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        let buffer = self.buffers.get_or_decode(resource)?;
        self.insert_emitter(id, buffer, position, options);
        Ok(())
    }

    /// Register an emitter over an already-decoded shared buffer
    pub fn create_emitter_from_buffer(
        &mut self,
        id: impl Into<String>,
        buffer: Arc<AudioBuffer>,
        position: Vec3,
        options: EmitterOptions,
    ) -> Result<()> {
        let id = id.into();
        if self.emitters.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.insert_emitter(id, buffer, position, options);
        Ok(())
    }

    fn insert_emitter(
        &mut self,
        id: String,
        buffer: Arc<AudioBuffer>,
        position: Vec3,
        options: EmitterOptions,
    ) {
        let mut emitter = SoundEmitter {
            name: options.name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            layer: options.layer,
            position: Vec3Ramp::new(position),
            velocity: Vec3::ZERO,
            buffer,
            state: PlaybackState::Idle,
            volume: options.volume.clamp(0.0, 1.0),
            bus_gain: 1.0,
            distance: options.distance,
            original_distance: options.distance,
            cone: options.cone,
            orientation: options.orientation,
            medium: options.medium,
            looping: options.looping,
            spatial: options.spatial,
            auto_remove: options.auto_remove,
            playback_rate: 1.0,
            head: 0.0,
            start_offset: 0.0,
            play_duration: None,
            delay: 0.0,
            generation: 0,
        };
        self.apply_acoustics(&mut emitter);
        debug!(
            "Created emitter {} on layer {} ({:.2}s buffer)",
            id,
            emitter.layer,
            emitter.buffer.duration()
        );
        self.emitters.insert(id, emitter);
    }

    /// Start (or restart) playback
    ///
    /// A playing emitter gets a fresh playback node; consumed nodes cannot be
    /// restarted on most platforms.
    pub fn play(
        &mut self,
        id: &str,
        when_offset: f32,
        start_offset: f32,
        duration: Option<f32>,
    ) -> Result<()> {
        let emitter = self.emitters.get_mut(id).ok_or_else(|| Error::emitter(id))?;
        if emitter.state.is_active() {
            trace!("Recreating playback node for {}", id);
        }
        emitter.generation += 1;
        emitter.start_offset = start_offset.max(0.0);
        emitter.head = emitter.start_offset;
        emitter.play_duration = duration.filter(|d| *d > 0.0);
        emitter.delay = when_offset.max(0.0);
        emitter.state = if emitter.looping {
            PlaybackState::Looping
        } else {
            PlaybackState::Playing
        };
        let generation = emitter.generation;
        debug!("Playing emitter {} (generation {})", id, generation);
        self.events.publish(SpatialEvent::Started {
            id: id.to_string(),
            generation,
        });
        Ok(())
    }

    /// Halt playback; stopping an idle emitter is a no-op
    pub fn stop(&mut self, id: &str) -> Result<()> {
        let emitter = self.emitters.get_mut(id).ok_or_else(|| Error::emitter(id))?;
        if emitter.state != PlaybackState::Idle {
            emitter.state = PlaybackState::Idle;
            emitter.head = 0.0;
            emitter.delay = 0.0;
            debug!("Stopped emitter {}", id);
        }
        Ok(())
    }

    /// Freeze the playback head
    pub fn pause(&mut self, id: &str) -> Result<()> {
        let emitter = self.emitters.get_mut(id).ok_or_else(|| Error::emitter(id))?;
        if emitter.state.is_active() {
            emitter.state = PlaybackState::Paused;
        }
        Ok(())
    }

    /// Continue from the frozen playback head
    pub fn resume(&mut self, id: &str) -> Result<()> {
        let emitter = self.emitters.get_mut(id).ok_or_else(|| Error::emitter(id))?;
        if emitter.state == PlaybackState::Paused {
            emitter.state = if emitter.looping {
                PlaybackState::Looping
            } else {
                PlaybackState::Playing
            };
        }
        Ok(())
    }

    /// Stop, disconnect and forget an emitter; unknown ids are ignored
    pub fn remove_emitter(&mut self, id: &str) -> bool {
        match self.emitters.remove(id) {
            Some(_) => {
                debug!("Removed emitter {}", id);
                self.events.publish(SpatialEvent::Removed { id: id.to_string() });
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------------

    /// Ramp an emitter toward `position` over the short interpolation window
    ///
    /// Unknown ids are ignored: position updates often race emitter removal.
    pub fn update_emitter_position(&mut self, id: &str, position: Vec3, velocity: Option<Vec3>) {
        let ramp = self.config.position_ramp;
        self.move_emitter(id, position, velocity, ramp);
    }

    /// Ramp an emitter toward `position` over `duration` seconds
    pub fn glide_emitter(&mut self, id: &str, position: Vec3, duration: f32) {
        self.move_emitter(id, position, None, duration);
    }

    fn move_emitter(&mut self, id: &str, position: Vec3, velocity: Option<Vec3>, duration: f32) {
        let sound_speed = self.sound_speed;
        let threshold = self.config.doppler_threshold;
        let listener_velocity = self.listener.velocity;

        let Some(emitter) = self.emitters.get_mut(id) else {
            trace!("Ignoring position update for unknown emitter {}", id);
            return;
        };
        emitter.position.ramp_to(position, duration);

        if let Some(velocity) = velocity {
            emitter.velocity = velocity;
            let relative = (velocity - listener_velocity).length();
            let rate = sound_speed / (sound_speed + relative);
            if (rate - 1.0).abs() > threshold {
                emitter.playback_rate = rate;
            } else if emitter.playback_rate != 1.0 {
                emitter.playback_rate = 1.0;
            }
        }
    }

    /// Ramp the listener pose; crossing the surface toggles submersion
    pub fn update_listener(
        &mut self,
        position: Option<Vec3>,
        forward: Option<Vec3>,
        up: Option<Vec3>,
        velocity: Option<Vec3>,
    ) {
        if let Some(position) = position {
            self.listener_position
                .ramp_to(position, self.config.position_ramp);
        }
        if let Some(forward) = forward {
            let forward = forward.normalize_or_zero();
            if forward != Vec3::ZERO {
                self.listener.forward = forward;
            }
        }
        if let Some(up) = up {
            let up = up.normalize_or_zero();
            if up != Vec3::ZERO {
                self.listener.up = up;
            }
        }
        if let Some(velocity) = velocity {
            self.listener.velocity = velocity;
        }

        let y = self.listener_position.target().y;
        let below = y < self.config.surface_level;
        let depth = (self.config.surface_level - y).max(0.0);
        if below != self.submersion.enabled {
            let overlay = self.submersion.clone();
            self.set_submerged(below, depth, overlay);
        } else if below && (self.submersion.depth - depth).abs() > f32::EPSILON {
            self.submersion.depth = depth;
            self.sound_speed = self.submersion.sound_speed();
        }
    }

    pub fn listener(&self) -> ListenerState {
        ListenerState {
            position: self.listener_position.value(),
            ..self.listener
        }
    }

    // -------------------------------------------------------------------------
    // Acoustics
    // -------------------------------------------------------------------------

    /// Select an environment and reapply its parameters to every emitter
    pub fn set_environment(&mut self, kind: EnvironmentKind) -> &EnvironmentProfile {
        if self.profile.kind != kind {
            info!("Environment: {:?} -> {:?}", self.profile.kind, kind);
        }
        self.profile = EnvironmentProfile::for_kind(kind);
        self.reapply_acoustics();
        self.events.publish(SpatialEvent::EnvironmentChanged(kind));
        &self.profile
    }

    pub fn environment(&self) -> &EnvironmentProfile {
        &self.profile
    }

    /// Enable or disable the submersion overlay
    pub fn set_submerged(&mut self, enabled: bool, depth: f32, overlay: SubmersionOverlay) {
        self.submersion = SubmersionOverlay {
            enabled,
            depth: if enabled { depth.max(0.0) } else { 0.0 },
            ..overlay
        };
        self.sound_speed = if enabled {
            self.submersion.sound_speed()
        } else {
            self.config.air_sound_speed
        };
        info!(
            "Submersion {} (depth {:.1}m, c = {:.0})",
            if enabled { "on" } else { "off" },
            self.submersion.depth,
            self.sound_speed
        );
        self.reapply_acoustics();
        self.events.publish(SpatialEvent::SubmersionChanged {
            enabled,
            depth: self.submersion.depth,
        });
    }

    pub fn submersion(&self) -> &SubmersionOverlay {
        &self.submersion
    }

    /// Current speed of sound (air or sea water)
    pub fn sound_speed(&self) -> f32 {
        self.sound_speed
    }

    fn reapply_acoustics(&mut self) {
        let mut emitters = std::mem::take(&mut self.emitters);
        for emitter in emitters.values_mut() {
            self.apply_acoustics(emitter);
        }
        self.emitters = emitters;
    }

    fn apply_acoustics(&self, emitter: &mut SoundEmitter) {
        let mut distance = emitter
            .original_distance
            .scaled(self.profile.reference_scale, self.profile.rolloff_scale);
        if self.submersion.enabled {
            distance = distance.scaled(
                self.config.submerged_reference_scale,
                self.config.submerged_rolloff_scale,
            );
        }
        emitter.distance = distance;
    }

    fn medium_response(&self, emitter: &SoundEmitter, distance: f32) -> (f32, f32) {
        let profile_lowpass = self.profile.lowpass_hz;
        match (self.submersion.enabled, emitter.medium) {
            (_, Medium::Enclosed) => (0.8, profile_lowpass.min(3_000.0)),
            (true, _) => (
                self.submersion.gain(distance, &self.config),
                profile_lowpass.min(self.submersion.lowpass_hz(&self.config)),
            ),
            (false, Medium::Submerged) => (
                self.config.through_surface_gain,
                self.config.through_surface_lowpass_hz,
            ),
            (false, Medium::Surface) => (1.0, profile_lowpass),
        }
    }

    // -------------------------------------------------------------------------
    // Mixing inputs
    // -------------------------------------------------------------------------

    /// Set the owning-layer gain of every emitter on `layer`
    pub fn set_layer_gain(&mut self, layer: &str, gain: f32) {
        for emitter in self.emitters.values_mut().filter(|e| e.layer == layer) {
            emitter.bus_gain = gain.max(0.0);
        }
    }

    /// Set an emitter's base volume
    pub fn set_emitter_volume(&mut self, id: &str, volume: f32) -> Result<()> {
        let emitter = self.emitters.get_mut(id).ok_or_else(|| Error::emitter(id))?;
        emitter.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    /// Replace an emitter's authored distance parameters
    pub fn set_emitter_distance(&mut self, id: &str, distance: DistanceParams) -> Result<()> {
        let mut emitter = self.emitters.remove(id).ok_or_else(|| Error::emitter(id))?;
        emitter.original_distance = distance;
        self.apply_acoustics(&mut emitter);
        self.emitters.insert(id.to_string(), emitter);
        Ok(())
    }

    /// Cap on simultaneously rendered spatial emitters
    pub fn set_max_sources(&mut self, max_sources: usize) {
        if max_sources != self.max_sources {
            debug!("Max spatial sources: {}", max_sources);
        }
        self.max_sources = max_sources;
    }

    pub fn max_sources(&self) -> usize {
        self.max_sources
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance ramps and playback heads
    pub fn tick(&mut self, delta_time: f32) {
        self.listener_position.advance(delta_time);

        let mut ended = Vec::new();
        for emitter in self.emitters.values_mut() {
            emitter.position.advance(delta_time);

            if !emitter.state.is_active() {
                continue;
            }
            let mut step = delta_time;
            if emitter.delay > 0.0 {
                let waited = emitter.delay.min(step);
                emitter.delay -= waited;
                step -= waited;
                if emitter.delay > 0.0 {
                    continue;
                }
            }
            emitter.head += step * emitter.playback_rate;

            if emitter.head >= emitter.end_time() {
                if emitter.looping {
                    emitter.head = emitter.start_offset;
                    self.events.publish(SpatialEvent::Looped {
                        id: emitter.id.clone(),
                    });
                } else {
                    emitter.state = PlaybackState::Idle;
                    emitter.head = 0.0;
                    ended.push((emitter.id.clone(), emitter.auto_remove));
                }
            }
        }

        for (id, auto_remove) in ended {
            trace!("Emitter {} ended", id);
            self.events.publish(SpatialEvent::Ended { id: id.clone() });
            if auto_remove {
                self.remove_emitter(&id);
            }
        }
    }

    /// Mix parameters for one emitter, ignoring the source cap
    pub fn mix_for(&self, id: &str) -> Option<EmitterMix> {
        self.emitters.get(id).map(|e| self.compute_mix(e))
    }

    fn compute_mix(&self, emitter: &SoundEmitter) -> EmitterMix {
        let listener = self.listener();
        let position = emitter.position();
        let base = emitter.volume * emitter.bus_gain * self.profile.gain;

        if !emitter.spatial {
            let centre = std::f32::consts::FRAC_1_SQRT_2;
            return EmitterMix {
                id: emitter.id.clone(),
                layer: emitter.layer.clone(),
                gain: base.clamp(0.0, 1.0),
                pan: (centre, centre),
                playback_rate: 1.0,
                lowpass_hz: self.profile.lowpass_hz,
                distance: 0.0,
            };
        }

        let to_listener = listener.position - position;
        let distance = to_listener.length();
        let attenuation = emitter.distance.attenuation(distance);
        let cone = emitter.cone.gain(emitter.orientation, to_listener);
        let (medium_gain, lowpass_hz) = self.medium_response(emitter, distance);

        EmitterMix {
            id: emitter.id.clone(),
            layer: emitter.layer.clone(),
            gain: (base * attenuation * cone * medium_gain).clamp(0.0, 1.0),
            pan: listener.calculate_panning(position),
            playback_rate: emitter.playback_rate,
            lowpass_hz,
            distance,
        }
    }

    /// Mix parameters for every playing emitter, honouring the source cap
    ///
    /// Non-spatial emitters never count toward the cap. When too many spatial
    /// emitters are playing, the quietest are culled.
    pub fn render(&self) -> Vec<EmitterMix> {
        let mut flat = Vec::new();
        let mut spatial = Vec::new();
        for emitter in self
            .emitters
            .values()
            .filter(|e| e.state.is_active() && e.delay <= 0.0)
        {
            let mix = self.compute_mix(emitter);
            if emitter.spatial {
                spatial.push(mix);
            } else {
                flat.push(mix);
            }
        }

        if spatial.len() > self.max_sources {
            spatial.sort_by(|a, b| b.gain.total_cmp(&a.gain));
            spatial.truncate(self.max_sources);
        }
        flat.extend(spatial);
        flat
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn emitter(&self, id: &str) -> Option<&SoundEmitter> {
        self.emitters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.emitters.contains_key(id)
    }

    pub fn emitters(&self) -> impl Iterator<Item = &SoundEmitter> {
        self.emitters.values()
    }

    pub fn emitters_on_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a SoundEmitter> {
        self.emitters.values().filter(move |e| e.layer == layer)
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    pub fn buffers_mut(&mut self) -> &mut BufferCache {
        &mut self.buffers
    }

    /// Remove every emitter
    pub fn clear(&mut self) {
        let ids: Vec<String> = self.emitters.keys().cloned().collect();
        for id in ids {
            self.remove_emitter(&id);
        }
    }
}
