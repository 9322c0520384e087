//! Layer mixer
//!
//! Decides which layers are audible and how loud, from three kinds of
//! signal:
//!
//! ```text
//! emotion readings ──► smoothing ──► per-layer volume / tempo / movement
//! interactions ──────► feedback emitters (ripple, voice reply) + layer boosts
//! story moments ─────► scheduled cues + adaptive triggers (10 Hz)
//! ```
//!
//! The mixer never renders audio itself. Every tick it pushes the current
//! layer gains into the [`SpatialField`] as bus gains, and it creates, moves
//! and removes feedback emitters there.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::buffer::AudioBuffer;
use crate::clock::{ScheduleKey, Scheduler, SegmentClock};
use crate::emotion::{EmotionTracker, EmotionalState};
use crate::events::{EventBus, EventStream};
use crate::interaction::{InteractionEvent, InteractionHistory, InteractionKind};
use crate::layer::{AudioLayer, LayerChannel, LayerState};
use crate::spatial::{DistanceParams, EmitterOptions, PlaybackState, SpatialField};
use crate::story::{CueAction, MomentContext, StoryMoment, TriggerResponse};
use crate::{AudioCategory, Error, Result};

/// Id of the always-open layer that carries interaction feedback
pub const FEEDBACK_LAYER: &str = "feedback";

/// Mixer tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Fraction of the way toward each new emotion reading (0.0 to 1.0)
    pub emotion_smoothing: f32,
    /// Ramp time for emotion-driven volume changes (seconds)
    pub emotion_ramp: f32,
    pub emotion_history: usize,
    pub interaction_history: usize,
    /// Adaptive trigger evaluation interval (seconds)
    pub trigger_interval: f32,
    /// Fade used when a caller does not specify one (seconds)
    pub default_fade: f32,
    /// Re-evaluate layers on emotion/interaction signals
    pub realtime: bool,
    /// Touch ripple lifetime (seconds)
    pub ripple_duration: f32,
    /// Radius the ripple expands to at full intensity
    pub ripple_radius: f32,
    /// Delay before a voice reply starts (seconds)
    pub voice_response_delay: f32,
    /// Length of a voice reply (seconds)
    pub voice_response_duration: f32,
    /// Sample rate of synthesized feedback tones
    pub feedback_sample_rate: u32,
    /// Gain multiplier for a layer while a lower-priority-number layer is
    /// fading in or audible (1.0 disables ducking)
    pub duck_level: f32,
    /// Ramp time into and out of a duck (seconds)
    pub duck_time: f32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            emotion_smoothing: 0.3,
            emotion_ramp: 1.0,
            emotion_history: 50,
            interaction_history: 100,
            trigger_interval: 0.1,
            default_fade: 1.0,
            realtime: true,
            ripple_duration: 3.0,
            ripple_radius: 6.0,
            voice_response_delay: 0.5,
            voice_response_duration: 1.5,
            feedback_sample_rate: 22_050,
            duck_level: 0.5,
            duck_time: 0.3,
        }
    }
}

/// Notifications published by the mixer
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    LayerStateChanged { layer: String, state: LayerState },
    EmotionChanged(EmotionalState),
    FeedbackSpawned { emitter: String, kind: InteractionKind },
    MomentStarted { id: String },
    CueFired { moment: String, index: usize },
    /// Guard not met at fire time
    CueSkipped { moment: String, index: usize },
    TriggerFired { moment: String, trigger: String, count: u32 },
}

#[derive(Debug, Clone)]
enum MixerAction {
    Cue(usize),
    RemoveEmitter(String),
}

#[derive(Debug, Clone)]
struct Ripple {
    emitter: String,
    age: f32,
    duration: f32,
    radius: f32,
    volume: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct TriggerBookkeeping {
    fired: u32,
    last_fired: Option<f64>,
}

/// Emotion-, interaction- and story-driven layer mixing
#[derive(Debug)]
pub struct LayerMixer {
    config: MixerConfig,
    layers: BTreeMap<String, LayerChannel>,
    emotion: EmotionTracker,
    interactions: InteractionHistory,
    choices: HashSet<String>,
    clock: SegmentClock,
    scheduler: Scheduler<MixerAction>,
    moment: Option<StoryMoment>,
    moment_started: f64,
    cue_keys: Vec<ScheduleKey>,
    triggers: HashMap<String, TriggerBookkeeping>,
    trigger_accumulator: f32,
    ripples: Vec<Ripple>,
    feedback_counter: u64,
    reverb_request: Option<f32>,
    events: EventBus<MixerEvent>,
}

impl LayerMixer {
    pub fn new(config: MixerConfig) -> Self {
        let mut clock = SegmentClock::new();
        clock.start();

        let mut feedback = LayerChannel::new(
            AudioLayer::new(FEEDBACK_LAYER, AudioCategory::Effects)
                .with_name("Interaction feedback")
                .with_priority(0),
        );
        feedback.fade_in(1.0, 0.0);
        feedback.advance(f32::MAX);

        let mut layers = BTreeMap::new();
        layers.insert(FEEDBACK_LAYER.to_string(), feedback);

        Self {
            emotion: EmotionTracker::new(config.emotion_smoothing, config.emotion_history),
            interactions: InteractionHistory::new(config.interaction_history),
            config,
            layers,
            choices: HashSet::new(),
            clock,
            scheduler: Scheduler::new(),
            moment: None,
            moment_started: 0.0,
            cue_keys: Vec::new(),
            triggers: HashMap::new(),
            trigger_accumulator: 0.0,
            ripples: Vec::new(),
            feedback_counter: 0,
            reverb_request: None,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventStream<MixerEvent> {
        self.events.subscribe()
    }

    /// Mixer time in seconds
    pub fn now(&self) -> f64 {
        self.clock.elapsed()
    }

    /// Enable or disable signal-driven re-evaluation (governor request)
    pub fn set_realtime(&mut self, realtime: bool) {
        if realtime != self.config.realtime {
            debug!("Realtime mixing {}", if realtime { "on" } else { "off" });
        }
        self.config.realtime = realtime;
    }

    // -------------------------------------------------------------------------
    // Layers
    // -------------------------------------------------------------------------

    pub fn add_layer(&mut self, layer: AudioLayer) -> Result<()> {
        if self.layers.contains_key(&layer.id) {
            return Err(Error::DuplicateId(layer.id));
        }
        debug!("Added layer {} ({:?})", layer.id, layer.category);
        self.layers.insert(layer.id.clone(), LayerChannel::new(layer));
        Ok(())
    }

    pub fn remove_layer(&mut self, field: &mut SpatialField, id: &str) -> Result<AudioLayer> {
        let channel = self.layers.remove(id).ok_or_else(|| Error::layer(id))?;
        Self::stop_members(field, channel.layer());
        Ok(channel.layer().clone())
    }

    pub fn layer(&self, id: &str) -> Option<&LayerChannel> {
        self.layers.get(id)
    }

    pub fn layers(&self) -> impl Iterator<Item = &LayerChannel> {
        self.layers.values()
    }

    /// Fade a layer in to its nominal volume over its fade time
    pub fn play_layer(&mut self, field: &mut SpatialField, id: &str) -> Result<()> {
        let layer = self.layers.get(id).ok_or_else(|| Error::layer(id))?.layer();
        let (volume, fade) = (layer.volume, layer.fade_time);
        self.activate(field, id, volume, fade)
    }

    /// Fade a layer out over its fade time; members stop once silent
    pub fn stop_layer(&mut self, id: &str) -> Result<()> {
        let channel = self.layers.get_mut(id).ok_or_else(|| Error::layer(id))?;
        let fade = channel.layer().fade_time;
        channel.fade_out(fade);
        Ok(())
    }

    pub fn fade_layer_in(&mut self, field: &mut SpatialField, id: &str, duration: f32) -> Result<()> {
        let volume = self
            .layers
            .get(id)
            .ok_or_else(|| Error::layer(id))?
            .layer()
            .volume;
        self.activate(field, id, volume, duration)
    }

    pub fn fade_layer_out(&mut self, id: &str, duration: f32) -> Result<()> {
        self.layers
            .get_mut(id)
            .ok_or_else(|| Error::layer(id))?
            .fade_out(duration);
        Ok(())
    }

    /// Fade `from` out and `to` in over the same window
    pub fn crossfade_layers(
        &mut self,
        field: &mut SpatialField,
        from: &str,
        to: &str,
        duration: f32,
    ) -> Result<()> {
        if !self.layers.contains_key(from) {
            return Err(Error::layer(from));
        }
        let volume = self
            .layers
            .get(to)
            .ok_or_else(|| Error::layer(to))?
            .layer()
            .volume;
        self.fade_layer_out(from, duration)?;
        self.activate(field, to, volume, duration)
    }

    /// Silence a layer and its emitters without a fade
    pub fn stop_layer_now(&mut self, field: &mut SpatialField, id: &str) -> Result<()> {
        let channel = self.layers.get_mut(id).ok_or_else(|| Error::layer(id))?;
        channel.stop_now();
        field.set_layer_gain(id, 0.0);
        Self::stop_members(field, channel.layer());
        self.events.publish(MixerEvent::LayerStateChanged {
            layer: id.to_string(),
            state: LayerState::Silent,
        });
        Ok(())
    }

    /// Silence every layer except feedback, immediately
    pub fn emergency_stop(&mut self, field: &mut SpatialField) {
        warn!("Emergency stop");
        let ids: Vec<String> = self
            .layers
            .keys()
            .filter(|id| *id != FEEDBACK_LAYER)
            .cloned()
            .collect();
        for id in ids {
            if let Err(e) = self.stop_layer_now(field, &id) {
                warn!("Emergency stop of {} failed: {}", id, e);
            }
        }
        for cue in self.cue_keys.drain(..) {
            self.scheduler.cancel(cue);
        }
    }

    fn activate(&mut self, field: &mut SpatialField, id: &str, volume: f32, duration: f32) -> Result<()> {
        let channel = self.layers.get(id).ok_or_else(|| Error::layer(id))?;
        let group = channel.layer().exclusion_group.clone();

        if let Some(group) = group {
            for (other_id, other) in self.layers.iter_mut() {
                let same_group = other.layer().exclusion_group.as_deref() == Some(group.as_str());
                if other_id != id
                    && same_group
                    && matches!(other.state(), LayerState::FadingIn | LayerState::Audible)
                {
                    debug!("Group {}: {} -> {}", group, other_id, id);
                    other.fade_out(duration);
                }
            }
        }

        let channel = self.layers.get_mut(id).ok_or_else(|| Error::layer(id))?;
        let was_active = channel.is_active();
        channel.fade_in(volume, duration);
        if !was_active {
            debug!("Layer {} fading in to {:.2} over {:.2}s", id, volume, duration);
        }
        Self::start_members(field, channel.layer());
        Ok(())
    }

    fn member_ids(field: &SpatialField, layer: &AudioLayer) -> Vec<String> {
        let mut ids: Vec<String> = field
            .emitters_on_layer(&layer.id)
            .map(|e| e.id().to_string())
            .collect();
        for id in &layer.emitters {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    fn start_members(field: &mut SpatialField, layer: &AudioLayer) {
        for id in Self::member_ids(field, layer) {
            let idle = field
                .emitter(&id)
                .map(|e| e.state() == PlaybackState::Idle);
            match idle {
                Some(true) => {
                    if let Err(e) = field.play(&id, 0.0, 0.0, None) {
                        warn!("Layer {}: emitter {} failed to start: {}", layer.id, id, e);
                    }
                }
                Some(false) => {}
                None => trace!("Layer {}: member {} not created yet", layer.id, id),
            }
        }
    }

    fn stop_members(field: &mut SpatialField, layer: &AudioLayer) {
        for id in Self::member_ids(field, layer) {
            if !field.contains(&id) {
                continue;
            }
            if let Err(e) = field.stop(&id) {
                warn!("Layer {}: emitter {} failed to stop: {}", layer.id, id, e);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Signals
    // -------------------------------------------------------------------------

    /// Smooth a new emotion reading in and re-evaluate matching layers
    pub fn update_emotional_state(&mut self, field: &mut SpatialField, reading: EmotionalState) {
        let current = self.emotion.update(reading).clone();
        self.events.publish(MixerEvent::EmotionChanged(current.clone()));

        if !self.config.realtime {
            return;
        }

        let ramp = self.config.emotion_ramp;
        let intensity = current.intensity;
        let matching: Vec<String> = self
            .layers
            .values()
            .filter(|ch| ch.layer().emotion_triggers.contains(&current.primary))
            .map(|ch| ch.id().to_string())
            .collect();

        for id in matching {
            let Some(channel) = self.layers.get_mut(&id) else {
                continue;
            };
            let layer = channel.layer().clone();
            let target = layer.emotional_volume(intensity);

            if matches!(channel.state(), LayerState::Silent | LayerState::FadingOut) {
                if let Err(e) = self.activate(field, &id, target, ramp) {
                    warn!("Emotion activation of {} failed: {}", id, e);
                }
            } else {
                channel.modulate(target, ramp);
            }

            let response = layer.response;
            if layer.category == AudioCategory::Music {
                if let Some(channel) = self.layers.get_mut(&id) {
                    channel.set_tempo(1.0 + (intensity - 0.5) * response.tempo_sensitivity);
                    channel.set_harmony((intensity - 0.5) * response.harmonic_shift * 12.0);
                }
            }
            if response.spatial_movement {
                Self::nudge_members(field, &layer, intensity, ramp);
            }
            if response.reverb_adaptation {
                self.reverb_request = Some((0.15 + 0.35 * intensity).clamp(0.0, 1.0));
            }
        }
    }

    /// Pull members closer as intensity rises, push them out as it falls
    fn nudge_members(field: &mut SpatialField, layer: &AudioLayer, intensity: f32, duration: f32) {
        let listener = field.listener().position;
        let scale = 1.0 - (intensity - 0.5) * 0.5;
        for id in Self::member_ids(field, layer) {
            let Some(emitter) = field.emitter(&id) else {
                continue;
            };
            if !emitter.is_spatial() {
                continue;
            }
            let offset = emitter.target_position() - listener;
            let target = listener + offset * scale;
            field.glide_emitter(&id, target, duration);
        }
    }

    /// Reverb wet mix requested by emotion adaptation since the last call
    pub fn take_reverb_request(&mut self) -> Option<f32> {
        self.reverb_request.take()
    }

    pub fn emotional_state(&self) -> &EmotionalState {
        self.emotion.current()
    }

    pub fn emotion_tracker(&self) -> &EmotionTracker {
        &self.emotion
    }

    /// Record an interaction, spawn its feedback and boost matching layers
    pub fn handle_interaction(&mut self, field: &mut SpatialField, mut event: InteractionEvent) {
        event.timestamp = self.now();
        self.interactions.record(event.clone());

        match event.kind {
            InteractionKind::Touch => self.spawn_ripple(field, &event),
            InteractionKind::Voice => self.spawn_voice_response(field, &event),
            InteractionKind::Choice => {
                if let Some(option) = &event.target {
                    self.record_choice(option.clone());
                }
            }
            InteractionKind::Gesture | InteractionKind::Gaze => {}
        }

        if !self.config.realtime {
            return;
        }

        let matching: Vec<(String, f32, f32)> = self
            .layers
            .values()
            .filter(|ch| ch.layer().interaction_triggers.contains(&event.kind))
            .map(|ch| {
                let layer = ch.layer();
                let target = (layer.volume * (0.7 + 0.6 * event.intensity)).clamp(0.0, 1.0);
                (layer.id.clone(), target, layer.fade_time * 0.5)
            })
            .collect();

        for (id, target, fade) in matching {
            let silent = self
                .layers
                .get(&id)
                .is_some_and(|ch| matches!(ch.state(), LayerState::Silent | LayerState::FadingOut));
            if silent {
                if let Err(e) = self.activate(field, &id, target, fade) {
                    warn!("Interaction activation of {} failed: {}", id, e);
                }
            } else if let Some(channel) = self.layers.get_mut(&id) {
                channel.modulate(target, fade);
            }
        }
    }

    pub fn interactions(&self) -> &InteractionHistory {
        &self.interactions
    }

    /// Remember a user choice for cue guards
    pub fn record_choice(&mut self, option: impl Into<String>) {
        let option = option.into();
        debug!("Choice recorded: {}", option);
        self.choices.insert(option);
    }

    pub fn choices(&self) -> &HashSet<String> {
        &self.choices
    }

    fn next_feedback_id(&mut self, prefix: &str) -> String {
        self.feedback_counter += 1;
        format!("{}-{}", prefix, self.feedback_counter)
    }

    fn spawn_feedback(
        &mut self,
        field: &mut SpatialField,
        id: &str,
        buffer: AudioBuffer,
        position: Vec3,
        volume: f32,
        delay: f32,
    ) -> bool {
        let options = EmitterOptions::one_shot(FEEDBACK_LAYER).with_volume(volume);
        let result = field
            .create_emitter_from_buffer(id, Arc::new(buffer), position, options)
            .and_then(|_| field.play(id, delay, 0.0, None));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Feedback emitter {} failed: {}", id, e);
                field.remove_emitter(id);
                false
            }
        }
    }

    fn spawn_ripple(&mut self, field: &mut SpatialField, event: &InteractionEvent) {
        let id = self.next_feedback_id("ripple");
        let duration = self.config.ripple_duration;
        let frequency = 440.0 + 440.0 * event.intensity;
        let buffer = AudioBuffer::tone(
            &id,
            frequency,
            duration,
            self.config.feedback_sample_rate,
            1.5,
        );
        let position = event.position.unwrap_or(field.listener().position);
        let volume = (0.3 + 0.7 * event.intensity).clamp(0.0, 1.0);

        if self.spawn_feedback(field, &id, buffer, position, volume, 0.0) {
            self.ripples.push(Ripple {
                emitter: id.clone(),
                age: 0.0,
                duration,
                radius: self.config.ripple_radius * event.intensity.max(0.1),
                volume,
            });
            let deadline = self.now() + f64::from(duration) + 0.25;
            self.scheduler
                .schedule_at(deadline, MixerAction::RemoveEmitter(id.clone()));
            self.events.publish(MixerEvent::FeedbackSpawned {
                emitter: id,
                kind: InteractionKind::Touch,
            });
        }
    }

    fn spawn_voice_response(&mut self, field: &mut SpatialField, event: &InteractionEvent) {
        let id = self.next_feedback_id("voice-response");
        let delay = self.config.voice_response_delay;
        let duration = self.config.voice_response_duration;
        let buffer = AudioBuffer::tone(&id, 220.0, duration, self.config.feedback_sample_rate, 2.0);

        let listener = field.listener();
        let start = listener.position + listener.forward * 8.0 + listener.right() * 3.0;
        let volume = (0.4 + 0.6 * event.intensity).clamp(0.0, 1.0);

        if self.spawn_feedback(field, &id, buffer, start, volume, delay) {
            let arrival = listener.position + listener.forward * 1.5;
            field.glide_emitter(&id, arrival, delay + duration);
            let deadline = self.now() + f64::from(delay + duration) + 0.1;
            self.scheduler
                .schedule_at(deadline, MixerAction::RemoveEmitter(id.clone()));
            self.events.publish(MixerEvent::FeedbackSpawned {
                emitter: id,
                kind: InteractionKind::Voice,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Story moments
    // -------------------------------------------------------------------------

    /// Make `moment` current and schedule its cues relative to now
    pub fn start_story_moment(&mut self, field: &mut SpatialField, moment: StoryMoment) {
        for key in self.cue_keys.drain(..) {
            self.scheduler.cancel(key);
        }
        self.triggers.clear();
        self.trigger_accumulator = 0.0;

        let now = self.now();
        self.moment_started = now;
        for (index, cue) in moment.cues.iter().enumerate() {
            let key = self
                .scheduler
                .schedule_at(now + cue.offset.max(0.0), MixerAction::Cue(index));
            self.cue_keys.push(key);
        }
        info!(
            "Story moment {} ({} cues, {} triggers)",
            moment.id,
            moment.cues.len(),
            moment.triggers.len()
        );

        let story_layers: Vec<String> = self
            .layers
            .values()
            .filter(|ch| ch.layer().story_triggers.contains(&moment.id))
            .map(|ch| ch.id().to_string())
            .collect();
        self.events.publish(MixerEvent::MomentStarted {
            id: moment.id.clone(),
        });
        self.moment = Some(moment);

        for id in story_layers {
            if let Err(e) = self.play_layer(field, &id) {
                warn!("Story activation of {} failed: {}", id, e);
            }
        }
    }

    pub fn current_moment(&self) -> Option<&StoryMoment> {
        self.moment.as_ref()
    }

    /// Fire count of a trigger in the current moment
    pub fn trigger_fire_count(&self, trigger: &str) -> u32 {
        self.triggers.get(trigger).map_or(0, |t| t.fired)
    }

    fn context(&self) -> MomentContext<'_> {
        let now = self.now();
        MomentContext {
            emotion: self.emotion.current(),
            interactions: &self.interactions,
            choices: &self.choices,
            now,
            elapsed: now - self.moment_started,
        }
    }

    fn fire_cue(&mut self, field: &mut SpatialField, index: usize) {
        let Some(moment) = &self.moment else {
            return;
        };
        let Some(cue) = moment.cues.get(index).cloned() else {
            return;
        };
        let moment_id = moment.id.clone();

        if let Some(guard) = &cue.guard {
            if !guard.is_met(&self.context()) {
                debug!("Cue {}#{} skipped: guard not met", moment_id, index);
                self.events.publish(MixerEvent::CueSkipped {
                    moment: moment_id,
                    index,
                });
                return;
            }
        }

        let result = match &cue.action {
            CueAction::Play => self.play_layer(field, &cue.target),
            CueAction::Stop => self.stop_layer(&cue.target),
            CueAction::FadeIn { duration } => self.fade_layer_in(field, &cue.target, *duration),
            CueAction::FadeOut { duration } => self.fade_layer_out(&cue.target, *duration),
            CueAction::Crossfade { to, duration } => {
                self.crossfade_layers(field, &cue.target, to, *duration)
            }
            CueAction::SpatialMove { position, duration } => {
                if field.contains(&cue.target) {
                    field.glide_emitter(&cue.target, *position, *duration);
                    Ok(())
                } else {
                    Err(Error::emitter(cue.target.as_str()))
                }
            }
        };

        match result {
            Ok(()) => {
                trace!("Cue {}#{} fired", moment_id, index);
                self.events.publish(MixerEvent::CueFired {
                    moment: moment_id,
                    index,
                });
            }
            Err(e) => warn!("Cue {}#{} failed: {}", moment_id, index, e),
        }
    }

    fn evaluate_triggers(&mut self, field: &mut SpatialField) {
        let Some(moment) = &self.moment else {
            return;
        };
        let ctx = self.context();
        let now = ctx.now;
        let ready: Vec<(String, TriggerResponse)> = moment
            .triggers
            .iter()
            .filter(|t| {
                let book = self.triggers.get(&t.id).copied().unwrap_or_default();
                t.can_fire(book.fired, book.last_fired, now) && t.condition.is_met(&ctx)
            })
            .map(|t| (t.id.clone(), t.response.clone()))
            .collect();
        let moment_id = moment.id.clone();

        for (trigger, response) in ready {
            let book = self.triggers.entry(trigger.clone()).or_default();
            book.fired += 1;
            book.last_fired = Some(now);
            let count = book.fired;

            debug!("Trigger {}/{} fired ({}x)", moment_id, trigger, count);
            if let Err(e) = self.apply_response(field, response) {
                warn!("Trigger {}/{} response failed: {}", moment_id, trigger, e);
            }
            self.events.publish(MixerEvent::TriggerFired {
                moment: moment_id.clone(),
                trigger,
                count,
            });
        }
    }

    fn apply_response(&mut self, field: &mut SpatialField, response: TriggerResponse) -> Result<()> {
        match response {
            TriggerResponse::AdjustLayerVolume {
                layer,
                volume,
                duration,
            } => {
                let channel = self.layers.get_mut(&layer).ok_or_else(|| Error::layer(&layer))?;
                if matches!(channel.state(), LayerState::Silent | LayerState::FadingOut) {
                    self.activate(field, &layer, volume, duration)
                } else {
                    channel.modulate(volume, duration);
                    Ok(())
                }
            }
            TriggerResponse::SpatialMove {
                emitter,
                position,
                duration,
            } => {
                if !field.contains(&emitter) {
                    return Err(Error::emitter(emitter));
                }
                field.glide_emitter(&emitter, position, duration);
                Ok(())
            }
            TriggerResponse::IntroduceTheme { layer } => self.play_layer(field, &layer),
            TriggerResponse::OneShot {
                frequency,
                duration,
                position,
                volume,
            } => {
                let id = self.next_feedback_id("one-shot");
                let buffer = AudioBuffer::tone(
                    &id,
                    frequency,
                    duration,
                    self.config.feedback_sample_rate,
                    3.0,
                );
                self.spawn_feedback(field, &id, buffer, position, volume, 0.0);
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance the mixer clock, fire due work and push bus gains to the field
    pub fn tick(&mut self, field: &mut SpatialField, delta_time: f32) {
        let now = self.clock.advance(f64::from(delta_time));

        for (_, action) in self.scheduler.drain_due(now) {
            match action {
                MixerAction::Cue(index) => self.fire_cue(field, index),
                MixerAction::RemoveEmitter(id) => {
                    if field.remove_emitter(&id) {
                        trace!("Feedback emitter {} expired", id);
                    }
                }
            }
        }

        self.trigger_accumulator += delta_time;
        if self.trigger_accumulator >= self.config.trigger_interval {
            self.trigger_accumulator %= self.config.trigger_interval.max(f32::EPSILON);
            self.evaluate_triggers(field);
        }

        self.update_ripples(field, delta_time);
        self.apply_ducking();

        let mut silenced = Vec::new();
        for (id, channel) in self.layers.iter_mut() {
            if channel.advance(delta_time) {
                let state = channel.state();
                trace!("Layer {} -> {:?}", id, state);
                if state == LayerState::Silent {
                    silenced.push(channel.layer().clone());
                }
                self.events.publish(MixerEvent::LayerStateChanged {
                    layer: id.clone(),
                    state,
                });
            }
            field.set_layer_gain(id, channel.volume());
        }
        for layer in silenced {
            Self::stop_members(field, &layer);
        }
    }

    /// Duck every layer outranked by a sounding layer, release the rest
    ///
    /// The feedback layer is always open, so it never ducks anything.
    fn apply_ducking(&mut self) {
        let loudest = self
            .layers
            .values()
            .filter(|ch| ch.id() != FEEDBACK_LAYER && ch.is_sounding())
            .map(|ch| ch.layer().priority)
            .min();
        let (level, time) = (self.config.duck_level, self.config.duck_time);
        for (id, channel) in self.layers.iter_mut() {
            let outranked = loudest.is_some_and(|p| p < channel.layer().priority);
            let target = if outranked { level } else { 1.0 };
            if outranked != channel.is_ducked() && level < 1.0 {
                debug!("Layer {} {}", id, if outranked { "ducked" } else { "released" });
            }
            channel.duck_to(target, time);
        }
    }

    fn update_ripples(&mut self, field: &mut SpatialField, delta_time: f32) {
        self.ripples.retain_mut(|ripple| {
            if !field.contains(&ripple.emitter) {
                return false;
            }
            ripple.age += delta_time;
            let progress = (ripple.age / ripple.duration).clamp(0.0, 1.0);
            let distance = DistanceParams {
                ref_distance: 1.0 + ripple.radius * progress,
                ..DistanceParams::default()
            };
            let volume = ripple.volume * (1.0 - progress);
            let result = field
                .set_emitter_distance(&ripple.emitter, distance)
                .and_then(|_| field.set_emitter_volume(&ripple.emitter, volume));
            if let Err(e) = result {
                warn!("Ripple {} update failed: {}", ripple.emitter, e);
                return false;
            }
            true
        });
    }

    /// Live feedback emitters (ripples, replies, one-shots)
    pub fn feedback_count(&self, field: &SpatialField) -> usize {
        field.emitters_on_layer(FEEDBACK_LAYER).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use crate::environment::AcousticsConfig;
    use crate::story::{AdaptiveTrigger, AudioCue, CueGuard, TriggerCondition};

    fn setup() -> (LayerMixer, SpatialField) {
        let mut mixer = LayerMixer::new(MixerConfig::default());
        mixer
            .add_layer(
                AudioLayer::new("ocean", AudioCategory::Ambience)
                    .with_volume(0.8)
                    .with_fade_time(1.0)
                    .triggered_by_emotion(Emotion::Calm),
            )
            .unwrap();
        mixer
            .add_layer(
                AudioLayer::new("theme", AudioCategory::Music)
                    .with_volume(0.6)
                    .with_fade_time(2.0)
                    .triggered_by_emotion(Emotion::Excitement)
                    .triggered_by_story("arrival"),
            )
            .unwrap();
        (mixer, SpatialField::new(AcousticsConfig::default()))
    }

    fn run(mixer: &mut LayerMixer, field: &mut SpatialField, seconds: f32) {
        let steps = (seconds / 0.05).round() as usize;
        for _ in 0..steps {
            mixer.tick(field, 0.05);
            field.tick(0.05);
        }
    }

    #[test]
    fn duplicate_layer_rejected() {
        let (mut mixer, _) = setup();
        let err = mixer
            .add_layer(AudioLayer::new("ocean", AudioCategory::Ambience))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
    }

    #[test]
    fn primitives_reject_unknown_layers() {
        let (mut mixer, mut field) = setup();
        assert!(mixer.play_layer(&mut field, "nope").is_err());
        assert!(mixer.stop_layer("nope").is_err());
        assert!(mixer.crossfade_layers(&mut field, "ocean", "nope", 1.0).is_err());
        assert!(mixer.remove_layer(&mut field, "nope").is_err());
    }

    #[test]
    fn emotion_activates_matching_layer() {
        let (mut mixer, mut field) = setup();
        mixer.update_emotional_state(&mut field, EmotionalState::new(Emotion::Excitement, 1.0));
        let theme = mixer.layer("theme").unwrap();
        assert_eq!(theme.state(), LayerState::FadingIn);
        assert_eq!(mixer.layer("ocean").unwrap().state(), LayerState::Silent);

        // intensity smoothed to 0.65 -> 0.6 * (1 + 0.15 * 0.5)
        let expected = 0.6 * (1.0 + 0.15 * 0.5);
        assert!((theme.target_volume() - expected).abs() < 1e-5);
        assert!(theme.tempo() == 1.0);
    }

    #[test]
    fn realtime_off_ignores_signals() {
        let (mut mixer, mut field) = setup();
        mixer.set_realtime(false);
        mixer.update_emotional_state(&mut field, EmotionalState::new(Emotion::Calm, 0.9));
        assert_eq!(mixer.layer("ocean").unwrap().state(), LayerState::Silent);
    }

    #[test]
    fn story_moment_activates_layers_and_fires_cues() {
        let (mut mixer, mut field) = setup();
        let mut events = mixer.subscribe();
        let moment = StoryMoment::new("arrival", "Arrival", 10.0)
            .with_cue(AudioCue::new(1.0, CueAction::Play, "ocean"))
            .with_cue(
                AudioCue::new(2.0, CueAction::Stop, "ocean").with_guard(CueGuard::Choice {
                    option: "leave".into(),
                }),
            );
        mixer.start_story_moment(&mut field, moment);
        assert_eq!(mixer.layer("theme").unwrap().state(), LayerState::FadingIn);

        run(&mut mixer, &mut field, 0.5);
        assert_eq!(mixer.layer("ocean").unwrap().state(), LayerState::Silent);
        run(&mut mixer, &mut field, 2.0);
        assert_ne!(mixer.layer("ocean").unwrap().state(), LayerState::Silent);

        let events = events.drain();
        assert!(events.contains(&MixerEvent::CueFired {
            moment: "arrival".into(),
            index: 0
        }));
        assert!(events.contains(&MixerEvent::CueSkipped {
            moment: "arrival".into(),
            index: 1
        }));
    }

    #[test]
    fn guard_is_evaluated_at_fire_time() {
        let (mut mixer, mut field) = setup();
        let moment = StoryMoment::new("fork", "Fork", 10.0).with_cue(
            AudioCue::new(1.0, CueAction::Play, "ocean").with_guard(CueGuard::Choice {
                option: "stay".into(),
            }),
        );
        mixer.start_story_moment(&mut field, moment);
        mixer.record_choice("stay");
        run(&mut mixer, &mut field, 1.5);
        assert_ne!(mixer.layer("ocean").unwrap().state(), LayerState::Silent);
    }

    #[test]
    fn trigger_respects_cooldown_and_max_fires() {
        let (mut mixer, mut field) = setup();
        let moment = StoryMoment::new("storm", "Storm", 30.0).with_trigger(
            AdaptiveTrigger::new(
                "gust",
                TriggerCondition::Elapsed { seconds: 0.5 },
                TriggerResponse::IntroduceTheme {
                    layer: "ocean".into(),
                },
            )
            .with_cooldown(1.0)
            .with_max_fires(3),
        );
        mixer.start_story_moment(&mut field, moment);

        run(&mut mixer, &mut field, 0.4);
        assert_eq!(mixer.trigger_fire_count("gust"), 0);
        run(&mut mixer, &mut field, 0.3);
        assert_eq!(mixer.trigger_fire_count("gust"), 1);
        run(&mut mixer, &mut field, 0.5);
        assert_eq!(mixer.trigger_fire_count("gust"), 1);
        run(&mut mixer, &mut field, 10.0);
        assert_eq!(mixer.trigger_fire_count("gust"), 3);
    }

    #[test]
    fn new_moment_resets_trigger_counts() {
        let (mut mixer, mut field) = setup();
        let moment = StoryMoment::new("a", "A", 5.0).with_trigger(AdaptiveTrigger::new(
            "t",
            TriggerCondition::Elapsed { seconds: 0.0 },
            TriggerResponse::IntroduceTheme {
                layer: "ocean".into(),
            },
        ).with_max_fires(1));
        mixer.start_story_moment(&mut field, moment.clone());
        run(&mut mixer, &mut field, 0.2);
        assert_eq!(mixer.trigger_fire_count("t"), 1);
        mixer.start_story_moment(&mut field, moment);
        assert_eq!(mixer.trigger_fire_count("t"), 0);
    }

    #[test]
    fn voice_reply_approaches_and_removes_itself() {
        let (mut mixer, mut field) = setup();
        mixer.handle_interaction(&mut field, InteractionEvent::voice(0.5));
        assert_eq!(mixer.feedback_count(&field), 1);
        let id = field.emitters_on_layer(FEEDBACK_LAYER).next().unwrap().id().to_string();
        let start = field.emitter(&id).unwrap().position();

        run(&mut mixer, &mut field, 1.0);
        let mid = field.emitter(&id).unwrap().position();
        assert!(mid.length() < start.length());

        run(&mut mixer, &mut field, 1.5);
        assert_eq!(mixer.feedback_count(&field), 0);
    }

    #[test]
    fn choice_interaction_records_option() {
        let (mut mixer, mut field) = setup();
        mixer.handle_interaction(&mut field, InteractionEvent::choice("follow"));
        assert!(mixer.choices().contains("follow"));
    }

    #[test]
    fn layer_members_stop_after_fade_out() {
        let (mut mixer, mut field) = setup();
        let surf = crate::AudioResource::from(AudioBuffer::silence("surf", 10.0, 100));
        field
            .create_emitter("surf", &surf, Vec3::ZERO, EmitterOptions::looping("ocean"))
            .unwrap();
        mixer.play_layer(&mut field, "ocean").unwrap();
        assert_eq!(field.emitter("surf").unwrap().state(), PlaybackState::Looping);

        run(&mut mixer, &mut field, 1.5);
        mixer.stop_layer("ocean").unwrap();
        run(&mut mixer, &mut field, 0.5);
        assert_eq!(field.emitter("surf").unwrap().state(), PlaybackState::Looping);
        run(&mut mixer, &mut field, 1.0);
        assert_eq!(field.emitter("surf").unwrap().state(), PlaybackState::Idle);
    }
}
