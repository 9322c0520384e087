//! Audio layers
//!
//! An [`AudioLayer`] is authored once at startup and never changes. Its
//! runtime side lives in a [`LayerChannel`]: a volume ramp plus the
//! silent / fading-in / audible / fading-out state machine. A second ramp
//! carries the priority duck, so ducking never disturbs a fade.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;
use crate::interaction::InteractionKind;
use crate::ramp::{FadeCurve, Ramp};
use crate::AudioCategory;

/// Shortest fade used when a caller asks for a zero-length one
pub const MIN_FADE: f32 = 0.01;

/// How strongly a layer follows emotional intensity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveResponse {
    pub tempo_sensitivity: f32,
    pub volume_sensitivity: f32,
    /// Nudge member emitters around when intensity changes
    pub spatial_movement: bool,
    pub harmonic_shift: f32,
    /// Nudge the reverb wet mix when intensity changes
    pub reverb_adaptation: bool,
    pub filter_sensitivity: f32,
}

impl Default for AdaptiveResponse {
    fn default() -> Self {
        Self {
            tempo_sensitivity: 0.0,
            volume_sensitivity: 0.5,
            spatial_movement: false,
            harmonic_shift: 0.0,
            reverb_adaptation: false,
            filter_sensitivity: 0.0,
        }
    }
}

/// Logical grouping of emitters with shared activation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioLayer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: AudioCategory,
    /// Member emitter ids
    #[serde(default)]
    pub emitters: Vec<String>,
    /// Nominal volume (0.0 to 1.0)
    pub volume: f32,
    /// Lower = more important
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub emotion_triggers: HashSet<Emotion>,
    #[serde(default)]
    pub interaction_triggers: HashSet<InteractionKind>,
    /// Story moment ids that activate this layer
    #[serde(default)]
    pub story_triggers: HashSet<String>,
    /// Fade-in/out time in seconds
    pub fade_time: f32,
    /// At most one member of a group is non-silent
    #[serde(default)]
    pub exclusion_group: Option<String>,
    #[serde(default)]
    pub response: AdaptiveResponse,
}

impl AudioLayer {
    pub fn new(id: impl Into<String>, category: AudioCategory) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category,
            emitters: Vec::new(),
            volume: 1.0,
            priority: 5,
            emotion_triggers: HashSet::new(),
            interaction_triggers: HashSet::new(),
            story_triggers: HashSet::new(),
            fade_time: 1.0,
            exclusion_group: None,
            response: AdaptiveResponse::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_fade_time(mut self, fade_time: f32) -> Self {
        self.fade_time = fade_time.max(0.0);
        self
    }

    pub fn with_emitter(mut self, emitter: impl Into<String>) -> Self {
        self.emitters.push(emitter.into());
        self
    }

    pub fn triggered_by_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion_triggers.insert(emotion);
        self
    }

    pub fn triggered_by_interaction(mut self, kind: InteractionKind) -> Self {
        self.interaction_triggers.insert(kind);
        self
    }

    pub fn triggered_by_story(mut self, moment: impl Into<String>) -> Self {
        self.story_triggers.insert(moment.into());
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.exclusion_group = Some(group.into());
        self
    }

    pub fn with_response(mut self, response: AdaptiveResponse) -> Self {
        self.response = response;
        self
    }

    /// Volume for an emotional intensity: nominal * clamp(1 + (i - 0.5) * s, 0.1, 2.0)
    pub fn emotional_volume(&self, intensity: f32) -> f32 {
        let factor = 1.0 + (intensity - 0.5) * self.response.volume_sensitivity;
        (self.volume * factor.clamp(0.1, 2.0)).clamp(0.0, 1.0)
    }
}

/// Per-layer activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerState {
    #[default]
    Silent,
    FadingIn,
    Audible,
    FadingOut,
}

/// Runtime state of one layer
#[derive(Debug, Clone)]
pub struct LayerChannel {
    layer: AudioLayer,
    gain: Ramp,
    /// Multiplier applied while a more important layer is active
    duck: Ramp,
    state: LayerState,
    /// Playback-rate multiplier for music layers
    tempo: f32,
    /// Harmonic shift in semitones for music layers
    harmony: f32,
}

impl LayerChannel {
    pub fn new(layer: AudioLayer) -> Self {
        Self {
            layer,
            gain: Ramp::new(0.0).with_curve(FadeCurve::Linear),
            duck: Ramp::new(1.0),
            state: LayerState::Silent,
            tempo: 1.0,
            harmony: 0.0,
        }
    }

    pub fn layer(&self) -> &AudioLayer {
        &self.layer
    }

    pub fn id(&self) -> &str {
        &self.layer.id
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Current gain, duck included
    pub fn volume(&self) -> f32 {
        self.gain.value() * self.duck.value()
    }

    /// Level the fade is heading toward, before ducking
    pub fn target_volume(&self) -> f32 {
        self.gain.target()
    }

    /// Current duck multiplier (1.0 when not ducked)
    pub fn duck_level(&self) -> f32 {
        self.duck.value()
    }

    pub fn is_ducked(&self) -> bool {
        self.duck.target() < 1.0
    }

    /// Occupies the mix: audible or on its way in
    pub fn is_sounding(&self) -> bool {
        matches!(self.state, LayerState::FadingIn | LayerState::Audible)
    }

    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    pub fn harmony(&self) -> f32 {
        self.harmony
    }

    /// Non-silent means audible or on its way in or out
    pub fn is_active(&self) -> bool {
        self.state != LayerState::Silent
    }

    /// Fade toward `target` from wherever the gain currently is
    ///
    /// A layer that is fading out turns straight back around.
    pub fn fade_in(&mut self, target: f32, duration: f32) {
        self.gain.ramp_to(target.clamp(0.0, 1.0), duration.max(MIN_FADE));
        self.state = LayerState::FadingIn;
    }

    pub fn fade_out(&mut self, duration: f32) {
        if self.state == LayerState::Silent {
            return;
        }
        self.gain.ramp_to(0.0, duration.max(MIN_FADE));
        self.state = LayerState::FadingOut;
    }

    /// Retarget the level without changing state (emotion/interaction modulation)
    pub fn modulate(&mut self, target: f32, duration: f32) {
        match self.state {
            LayerState::Audible | LayerState::FadingIn => {
                self.gain.ramp_to(target.clamp(0.0, 1.0), duration.max(MIN_FADE));
            }
            LayerState::Silent | LayerState::FadingOut => {}
        }
    }

    /// Silence immediately
    pub fn stop_now(&mut self) {
        self.gain.set_immediate(0.0);
        self.state = LayerState::Silent;
    }

    /// Ramp the duck multiplier toward `level`; a repeat request keeps the
    /// ramp in flight
    pub(crate) fn duck_to(&mut self, level: f32, duration: f32) {
        let level = level.clamp(0.0, 1.0);
        if self.duck.target() != level {
            self.duck.ramp_to(level, duration.max(MIN_FADE));
        }
    }

    pub(crate) fn set_tempo(&mut self, tempo: f32) {
        self.tempo = tempo.clamp(0.5, 2.0);
    }

    pub(crate) fn set_harmony(&mut self, harmony: f32) {
        self.harmony = harmony.clamp(-12.0, 12.0);
    }

    /// Advance the ramp; returns true when the state changed
    pub fn advance(&mut self, delta_time: f32) -> bool {
        self.duck.advance(delta_time);
        self.gain.advance(delta_time);
        if !self.gain.is_settled() {
            return false;
        }
        let next = match self.state {
            LayerState::FadingIn => LayerState::Audible,
            LayerState::FadingOut => LayerState::Silent,
            other => other,
        };
        let changed = next != self.state;
        self.state = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> LayerChannel {
        LayerChannel::new(AudioLayer::new("ocean", AudioCategory::Ambience).with_volume(0.8))
    }

    #[test]
    fn silent_to_audible_to_silent() {
        let mut ch = channel();
        ch.fade_in(0.8, 1.0);
        assert_eq!(ch.state(), LayerState::FadingIn);
        ch.advance(0.5);
        assert!((ch.volume() - 0.4).abs() < 1e-5);
        assert!(ch.advance(0.5));
        assert_eq!(ch.state(), LayerState::Audible);

        ch.fade_out(1.0);
        assert_eq!(ch.state(), LayerState::FadingOut);
        ch.advance(1.0);
        assert_eq!(ch.state(), LayerState::Silent);
        assert_eq!(ch.volume(), 0.0);
    }

    #[test]
    fn reactivation_during_fade_out_resumes_from_current_volume() {
        let mut ch = channel();
        ch.fade_in(0.8, 0.1);
        ch.advance(0.1);
        ch.fade_out(1.0);
        ch.advance(0.5);
        let mid = ch.volume();
        assert!(mid > 0.3 && mid < 0.5);

        ch.fade_in(0.8, 1.0);
        assert_eq!(ch.state(), LayerState::FadingIn);
        assert_eq!(ch.volume(), mid);
        ch.advance(0.1);
        assert!(ch.volume() > mid);
    }

    #[test]
    fn zero_duration_fade_still_ramps() {
        let mut ch = channel();
        ch.fade_in(1.0, 0.0);
        assert_eq!(ch.volume(), 0.0);
        ch.advance(MIN_FADE);
        assert_eq!(ch.volume(), 1.0);
    }

    #[test]
    fn stop_now_is_immediate() {
        let mut ch = channel();
        ch.fade_in(1.0, 0.1);
        ch.advance(0.1);
        ch.stop_now();
        assert_eq!(ch.volume(), 0.0);
        assert_eq!(ch.state(), LayerState::Silent);
    }

    #[test]
    fn modulation_does_not_wake_silent_layer() {
        let mut ch = channel();
        ch.modulate(0.9, 1.0);
        ch.advance(1.0);
        assert_eq!(ch.volume(), 0.0);
        assert_eq!(ch.state(), LayerState::Silent);
    }

    #[test]
    fn duck_scales_volume_without_touching_state() {
        let mut ch = channel();
        ch.fade_in(0.8, 0.1);
        ch.advance(0.1);
        assert_eq!(ch.state(), LayerState::Audible);

        ch.duck_to(0.5, 0.2);
        ch.duck_to(0.5, 0.2);
        ch.advance(0.1);
        assert!((ch.duck_level() - 0.75).abs() < 1e-5);
        ch.advance(0.1);
        assert!((ch.volume() - 0.4).abs() < 1e-5);
        assert!((ch.target_volume() - 0.8).abs() < 1e-6);
        assert_eq!(ch.state(), LayerState::Audible);

        ch.duck_to(1.0, 0.2);
        ch.advance(0.2);
        assert!(!ch.is_ducked());
        assert!((ch.volume() - 0.8).abs() < 1e-5);
    }

    #[test]
    fn emotional_volume_is_clamped() {
        let layer = AudioLayer::new("theme", AudioCategory::Music)
            .with_volume(0.6)
            .with_response(AdaptiveResponse {
                volume_sensitivity: 4.0,
                ..AdaptiveResponse::default()
            });
        assert!((layer.emotional_volume(0.5) - 0.6).abs() < 1e-6);
        assert!((layer.emotional_volume(0.0) - 0.06).abs() < 1e-6);
        assert!((layer.emotional_volume(1.0) - 1.0).abs() < 1e-6);
    }
}
