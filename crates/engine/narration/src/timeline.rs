//! Timeline / Synchronizer
//!
//! Drives one narrated segment end to end on a logical [`SegmentClock`]:
//! starts the narration and background tracks through the [`AudioEngine`],
//! shapes their fades every tick, applies the latest visual keyframe, fires
//! each sync event exactly once and reports progress until completion.
//!
//! The host calls [`Synchronizer::tick`] from its frame callback after
//! ticking the engine. Nothing here reads the wall clock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use oldtom_audio::{
    AudioBuffer, AudioCategory, AudioEngine, AudioLayer, DistanceParams, EmitterOptions,
    EmotionalState, EventBus, EventStream, SegmentClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::capability::{AudioStore, NarrationResolver, TrackSource, VoiceSynthesizer};
use crate::content::NarrativeContent;
use crate::error::{Error, Result};
use crate::segment::{AudioTrack, SyncAction, SyncEvent, SynchronizedSegment, VisualKeyframe};

/// Mixer layer carrying the narrator voice
pub const NARRATION_LAYER: &str = "narration";
/// Mixer layer carrying background ambience
pub const AMBIENCE_LAYER: &str = "ambience";
/// Mixer layer carrying background music
pub const MUSIC_LAYER: &str = "music";
/// Mixer layer carrying effect sounds fired by sync events
pub const EFFECTS_LAYER: &str = "effects";

/// Id, category and priority; narration outranks the rest so the mixer
/// ducks them under the voice
const LAYERS: [(&str, AudioCategory, u8); 4] = [
    (NARRATION_LAYER, AudioCategory::Voice, 1),
    (AMBIENCE_LAYER, AudioCategory::Ambience, 5),
    (MUSIC_LAYER, AudioCategory::Music, 5),
    (EFFECTS_LAYER, AudioCategory::Effects, 5),
];

/// Timeline tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Silence after the narration before the segment completes (seconds)
    pub tail_padding: f64,
    /// Where the interactive prompt lands, as a fraction of narration duration
    pub prompt_fraction: f64,
    pub synthesis_timeout_ms: u64,
    /// Duration estimate when narration audio cannot be measured
    pub words_per_minute: f32,
    pub narration_volume: f32,
    pub narration_fade_in: f32,
    pub narration_fade_out: f32,
    pub track_fade_in: f32,
    pub track_fade_out: f32,
    /// Switch the engine environment to the segment's scene
    pub apply_environment: bool,
    /// Intensity used when keyframes and beats push an emotion to the mixer
    pub emotion_intensity: f32,
    /// Sample rate of synthesized effect sounds
    pub effect_sample_rate: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            tail_padding: 2.0,
            prompt_fraction: 0.8,
            synthesis_timeout_ms: 20_000,
            words_per_minute: 150.0,
            narration_volume: 1.0,
            narration_fade_in: 0.3,
            narration_fade_out: 0.5,
            track_fade_in: 2.0,
            track_fade_out: 2.0,
            apply_environment: true,
            emotion_intensity: 0.6,
            effect_sample_rate: 8_000,
        }
    }
}

impl TimelineConfig {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

/// Where the synchronizer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineState {
    #[default]
    Idle,
    Prepared,
    Playing,
    Paused,
    Stopped,
    Complete,
}

/// Everything the timeline broadcasts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimelineEvent {
    SegmentStarted {
        segment: String,
        total_duration: f64,
    },
    VisualKeyframe {
        segment: String,
        index: usize,
        keyframe: VisualKeyframe,
    },
    SyncEvent {
        segment: String,
        /// Segment time at which the event fired
        elapsed: f64,
        event: SyncEvent,
    },
    TimeUpdate {
        segment: String,
        elapsed: f64,
        total: f64,
        progress: f64,
    },
    SegmentComplete {
        segment: String,
    },
    TrackSkipped {
        segment: String,
        track: String,
        reason: String,
    },
}

/// Emitter ids owned by the segment currently loaded into the engine
#[derive(Debug, Default)]
struct Voices {
    narration: Option<String>,
    tracks: Vec<(String, usize)>,
}

/// Plays synchronized segments through an [`AudioEngine`]
pub struct Synchronizer {
    config: TimelineConfig,
    content: Arc<NarrativeContent>,
    resolver: NarrationResolver,
    tracks: Arc<dyn TrackSource>,
    segment: Option<SynchronizedSegment>,
    state: TimelineState,
    clock: SegmentClock,
    fired: HashSet<String>,
    last_keyframe: Option<usize>,
    voices: Voices,
    events: EventBus<TimelineEvent>,
}

impl Synchronizer {
    pub fn new(
        config: TimelineConfig,
        content: Arc<NarrativeContent>,
        synthesizer: Arc<dyn VoiceSynthesizer>,
        store: Arc<dyn AudioStore>,
        tracks: Arc<dyn TrackSource>,
    ) -> Self {
        let resolver = NarrationResolver::new(synthesizer, store)
            .with_timeout(config.synthesis_timeout())
            .with_words_per_minute(config.words_per_minute);
        Self {
            config,
            content,
            resolver,
            tracks,
            segment: None,
            state: TimelineState::Idle,
            clock: SegmentClock::new(),
            fired: HashSet::new(),
            last_keyframe: None,
            voices: Voices::default(),
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn content(&self) -> &Arc<NarrativeContent> {
        &self.content
    }

    pub fn subscribe(&self) -> EventStream<TimelineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    /// Segment time in seconds
    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn segment(&self) -> Option<&SynchronizedSegment> {
        self.segment.as_ref()
    }

    /// Ids of sync events fired since the segment last started
    pub fn fired_events(&self) -> &HashSet<String> {
        &self.fired
    }

    pub fn is_playing(&self) -> bool {
        self.state == TimelineState::Playing
    }

    // -------------------------------------------------------------------------
    // Preparation
    // -------------------------------------------------------------------------

    /// Resolve narration, preload tracks and derive the segment timeline
    ///
    /// The prepared segment replaces any previous one once `play` is called.
    pub async fn prepare_segment(&mut self, id: &str) -> Result<SynchronizedSegment> {
        let descriptor = self.content.segment(id)?.clone();
        let voice = self.content.voice_for(&descriptor);

        let narration = self
            .resolver
            .resolve(&descriptor, &voice)
            .await
            .map_err(|e| Error::SegmentUnavailable {
                segment: descriptor.id.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Narration for {} is {:.2}s ({})",
            descriptor.id,
            narration.duration,
            if narration.measured { "measured" } else { "estimated" }
        );

        let total = narration.duration + self.config.tail_padding.max(0.0);
        let mut tracks = Vec::new();
        for tag in descriptor.soundscape_tags() {
            let track = tag.track();
            let resource = match self.tracks.load(&track).await {
                Ok(resource) => Some(resource),
                Err(e) => {
                    warn!("Skipping track {} for {}: {}", track.id, descriptor.id, e);
                    self.events.publish(TimelineEvent::TrackSkipped {
                        segment: descriptor.id.clone(),
                        track: track.id.clone(),
                        reason: e.to_string(),
                    });
                    None
                }
            };
            tracks.push(AudioTrack::from_descriptor(&track, resource, total, &self.config));
        }

        let segment = SynchronizedSegment::derive(&descriptor, narration, tracks, &self.config);
        info!(
            "Prepared segment {} ({:.2}s, {} keyframes, {} events)",
            segment.id,
            segment.total_duration,
            segment.keyframes.len(),
            segment.events.len()
        );
        Ok(segment)
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// Start `segment`, or restart the current one when `None`
    ///
    /// Narration that cannot be placed in the engine is an error and nothing
    /// starts: the timeline is left idle with no segment. Background tracks
    /// that fail are skipped.
    pub fn play(
        &mut self,
        engine: &mut AudioEngine,
        segment: Option<SynchronizedSegment>,
    ) -> Result<()> {
        engine.ensure_initialized()?;
        if segment.is_none() && self.segment.is_none() {
            return Err(Error::SegmentUnavailable {
                segment: String::new(),
                reason: "no segment prepared".into(),
            });
        }
        self.release(engine);
        if let Some(segment) = segment {
            self.segment = Some(segment);
        }
        if let Err(e) = self.start_current(engine) {
            self.abandon(engine);
            return Err(e);
        }
        Ok(())
    }

    /// Place the current segment's emitters and start the clock
    fn start_current(&mut self, engine: &mut AudioEngine) -> Result<()> {
        let Some(segment) = self.segment.as_ref() else {
            return Ok(());
        };
        let segment_id = segment.id.clone();

        Self::ensure_layers(engine)?;
        if self.config.apply_environment {
            engine.set_environment(segment.environment)?;
        }

        let narration = &segment.narration;
        {
            let field = engine.field_mut()?;
            field.create_emitter(
                narration.id.clone(),
                &narration.resource,
                Vec3::ZERO,
                EmitterOptions::new(NARRATION_LAYER)
                    .non_spatial()
                    .with_volume(0.0),
            )?;
            if let Err(e) = field.play(&narration.id, narration.start_offset as f32, 0.0, None) {
                field.remove_emitter(&narration.id);
                return Err(e.into());
            }
        }
        self.voices.narration = Some(narration.id.clone());

        let mut skipped = Vec::new();
        for (index, track) in segment.tracks.iter().enumerate() {
            if track.resource.is_none() {
                // reported when the segment was prepared
                continue;
            }
            let emitter_id = format!("track:{}:{}", segment_id, track.id);
            match Self::start_track(engine, &emitter_id, track) {
                Ok(()) => self.voices.tracks.push((emitter_id, index)),
                Err(reason) => {
                    warn!("Skipping track {} for {}: {}", track.id, segment_id, reason);
                    skipped.push((track.id.clone(), reason));
                }
            }
        }
        for (track, reason) in skipped {
            self.events.publish(TimelineEvent::TrackSkipped {
                segment: segment_id.clone(),
                track,
                reason,
            });
        }

        for (layer, _, _) in LAYERS {
            engine.play_layer(layer)?;
        }
        engine.update_emotional_state(EmotionalState::new(
            segment.tone,
            self.config.emotion_intensity,
        ))?;

        let total_duration = segment.total_duration;
        self.clock.reset();
        self.clock.start();
        self.fired.clear();
        self.last_keyframe = None;
        self.state = TimelineState::Playing;
        info!("Playing segment {} ({:.2}s)", segment_id, total_duration);
        self.events.publish(TimelineEvent::SegmentStarted {
            segment: segment_id,
            total_duration,
        });
        Ok(())
    }

    /// Freeze the clock and every owned emitter
    pub fn pause(&mut self, engine: &mut AudioEngine) -> Result<()> {
        if self.state != TimelineState::Playing {
            return Ok(());
        }
        self.clock.pause();
        let field = engine.field_mut()?;
        for id in self.voices.ids() {
            if field.contains(id) {
                field.pause(id)?;
            }
        }
        self.state = TimelineState::Paused;
        debug!("Timeline paused at {:.2}s", self.clock.elapsed());
        Ok(())
    }

    /// Continue from where `pause` left off
    pub fn resume(&mut self, engine: &mut AudioEngine) -> Result<()> {
        if self.state != TimelineState::Paused {
            return Ok(());
        }
        let field = engine.field_mut()?;
        for id in self.voices.ids() {
            if field.contains(id) {
                field.resume(id)?;
            }
        }
        self.clock.resume();
        self.state = TimelineState::Playing;
        debug!("Timeline resumed at {:.2}s", self.clock.elapsed());
        Ok(())
    }

    /// Halt and rewind; the segment stays loaded for another `play(None)`
    pub fn stop(&mut self, engine: &mut AudioEngine) -> Result<()> {
        if self.segment.is_none() {
            return Ok(());
        }
        let field = engine.field_mut()?;
        for id in self.voices.ids() {
            if field.contains(id) {
                field.stop(id)?;
            }
        }
        self.clock.reset();
        self.fired.clear();
        self.last_keyframe = None;
        self.state = TimelineState::Stopped;
        debug!("Timeline stopped");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Synchronization loop
    // -------------------------------------------------------------------------

    /// Advance the segment clock and emit everything that became due
    pub fn tick(&mut self, engine: &mut AudioEngine, delta_time: f32) -> Result<()> {
        if self.state != TimelineState::Playing {
            return Ok(());
        }
        let Some(segment) = self.segment.as_ref() else {
            return Ok(());
        };
        let elapsed = self.clock.advance(f64::from(delta_time));
        let segment_id = segment.id.clone();

        self.apply_fades(engine, elapsed)?;

        if let Some(index) = segment.keyframe_at(elapsed) {
            if self.last_keyframe != Some(index) {
                self.last_keyframe = Some(index);
                let keyframe = segment.keyframes[index].clone();
                self.apply_keyframe(engine, &keyframe)?;
                trace!("Keyframe {} at {:.2}s", index, keyframe.time);
                self.events.publish(TimelineEvent::VisualKeyframe {
                    segment: segment_id.clone(),
                    index,
                    keyframe,
                });
            }
        }

        let due: Vec<SyncEvent> = segment
            .events
            .iter()
            .filter(|e| e.timestamp <= elapsed && !self.fired.contains(&e.id))
            .cloned()
            .collect();
        for event in due {
            self.fired.insert(event.id.clone());
            self.apply_sync_event(engine, &segment_id, &event)?;
            debug!("Sync event {} fired at {:.2}s", event.id, elapsed);
            self.events.publish(TimelineEvent::SyncEvent {
                segment: segment_id.clone(),
                elapsed,
                event,
            });
        }

        let total = segment.total_duration;
        self.events.publish(TimelineEvent::TimeUpdate {
            segment: segment_id.clone(),
            elapsed,
            total,
            progress: segment.progress(elapsed),
        });

        if elapsed >= total {
            self.release(engine);
            self.clock.pause();
            self.state = TimelineState::Complete;
            info!("Segment {} complete", segment_id);
            self.events.publish(TimelineEvent::SegmentComplete {
                segment: segment_id,
            });
        }
        Ok(())
    }

    fn apply_fades(&self, engine: &mut AudioEngine, elapsed: f64) -> Result<()> {
        let Some(segment) = self.segment.as_ref() else {
            return Ok(());
        };
        let field = engine.field_mut()?;

        if let Some(id) = &self.voices.narration {
            let n = &segment.narration;
            let end = n.start_offset + n.duration;
            let gain = Self::fade_gain(elapsed, n.start_offset, end, n.fade_in, n.fade_out);
            if let Err(e) = field.set_emitter_volume(id, n.volume * gain) {
                trace!("Narration fade skipped: {}", e);
            }
        }
        for (id, index) in &self.voices.tracks {
            let Some(track) = segment.tracks.get(*index) else {
                continue;
            };
            let end = track.start_offset + track.duration;
            let gain = Self::fade_gain(elapsed, track.start_offset, end, track.fade_in, track.fade_out);
            if let Err(e) = field.set_emitter_volume(id, track.volume * gain) {
                trace!("Track fade skipped for {}: {}", id, e);
            }
        }
        Ok(())
    }

    fn apply_keyframe(&self, engine: &mut AudioEngine, keyframe: &VisualKeyframe) -> Result<()> {
        if let (Some(scene), true) = (keyframe.scene, self.config.apply_environment) {
            engine.set_environment(scene.environment())?;
        }
        if let Some(emotion) = keyframe.emotion {
            engine.update_emotional_state(EmotionalState::new(emotion, self.config.emotion_intensity))?;
        }
        Ok(())
    }

    fn apply_sync_event(
        &self,
        engine: &mut AudioEngine,
        segment_id: &str,
        event: &SyncEvent,
    ) -> Result<()> {
        match &event.action {
            SyncAction::PlaySound {
                effect,
                frequency,
                duration,
                position,
                volume,
            } => {
                let id = format!("sfx:{}:{}", segment_id, event.id);
                let buffer = AudioBuffer::tone(
                    format!("{effect:?}").to_lowercase(),
                    *frequency,
                    *duration,
                    self.config.effect_sample_rate,
                    3.0,
                );
                let field = engine.field_mut()?;
                let started = field
                    .create_emitter_from_buffer(
                        id.clone(),
                        Arc::new(buffer),
                        *position,
                        EmitterOptions::one_shot(EFFECTS_LAYER).with_volume(*volume),
                    )
                    .and_then(|_| field.play(&id, 0.0, 0.0, None));
                if let Err(e) = started {
                    warn!("Effect sound {} failed: {}", id, e);
                    field.remove_emitter(&id);
                }
            }
            SyncAction::EmotionBeat { emotion, .. } => {
                engine.update_emotional_state(EmotionalState::new(*emotion, self.config.emotion_intensity))?;
            }
            SyncAction::TriggerEffect { .. } | SyncAction::InteractivePrompt { .. } => {}
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Linear envelope: 0 → 1 over `fade_in` after `start`, 1 → 0 over `fade_out` before `end`
    fn fade_gain(t: f64, start: f64, end: f64, fade_in: f32, fade_out: f32) -> f32 {
        if t < start || t >= end {
            return 0.0;
        }
        let fade_in = f64::from(fade_in.max(0.0));
        let fade_out = f64::from(fade_out.max(0.0));
        let rising = if fade_in > 0.0 { (t - start) / fade_in } else { 1.0 };
        let falling = if fade_out > 0.0 { (end - t) / fade_out } else { 1.0 };
        rising.min(falling).clamp(0.0, 1.0) as f32
    }

    fn ensure_layers(engine: &mut AudioEngine) -> Result<()> {
        let mixer = engine.mixer_mut()?;
        for (id, category, priority) in LAYERS {
            if mixer.layer(id).is_none() {
                mixer.add_layer(
                    AudioLayer::new(id, category)
                        .with_volume(1.0)
                        .with_fade_time(0.05)
                        .with_priority(priority),
                )?;
            }
        }
        Ok(())
    }

    fn start_track(
        engine: &mut AudioEngine,
        emitter_id: &str,
        track: &AudioTrack,
    ) -> std::result::Result<(), String> {
        let resource = track.resource.as_ref().ok_or("not loaded")?;
        let layer = match track.category {
            AudioCategory::Music => MUSIC_LAYER,
            _ => AMBIENCE_LAYER,
        };
        let mut options = if track.looping {
            EmitterOptions::looping(layer)
        } else {
            EmitterOptions::new(layer)
        }
        .with_volume(0.0);
        let position = match track.position {
            Some(position) => {
                options = options.with_distance(DistanceParams {
                    max_distance: track.max_distance,
                    ..DistanceParams::default()
                });
                position
            }
            None => {
                options = options.non_spatial();
                Vec3::ZERO
            }
        };

        let field = engine.field_mut().map_err(|e| e.to_string())?;
        field
            .create_emitter(emitter_id, resource, position, options)
            .map_err(|e| e.to_string())?;
        if let Err(e) = field.play(emitter_id, track.start_offset as f32, 0.0, None) {
            field.remove_emitter(emitter_id);
            return Err(e.to_string());
        }
        Ok(())
    }

    /// Stop and forget every emitter started for the current segment
    /// Drop a segment that failed to start so `tick` has nothing to run
    fn abandon(&mut self, engine: &mut AudioEngine) {
        self.release(engine);
        if let Some(segment) = self.segment.take() {
            warn!("Segment {} did not start", segment.id);
        }
        self.clock.reset();
        self.fired.clear();
        self.last_keyframe = None;
        self.state = TimelineState::Idle;
    }

    fn release(&mut self, engine: &mut AudioEngine) {
        let voices = std::mem::take(&mut self.voices);
        let Ok(field) = engine.field_mut() else {
            return;
        };
        for id in voices.ids() {
            field.remove_emitter(id);
        }
    }
}

impl Voices {
    fn ids(&self) -> impl Iterator<Item = &String> {
        self.narration
            .iter()
            .chain(self.tracks.iter().map(|(id, _)| id))
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("state", &self.state)
            .field("elapsed", &self.clock.elapsed())
            .field("segment", &self.segment.as_ref().map(|s| s.id.as_str()))
            .field("fired", &self.fired.len())
            .finish()
    }
}
