//! Synchronized segments
//!
//! A [`SynchronizedSegment`] bundles everything the timeline needs to play one
//! narrated unit: the narration track, background tracks, visual keyframes
//! and discrete sync events, all on one segment clock. It is derived from a
//! [`SegmentDescriptor`] plus the measured narration duration and rebuilt on
//! every activation.
//!
//! Timing rules (`d` = narration duration):
//!
//! ```text
//! 0.0                      opening keyframe (scene camera, tone)
//! (i+1)·d/(n+1)            effect i of n: keyframe + trigger event (+ sound)
//! 0.25d / 0.6d             push-in camera moves for energetic tones
//! 0.5d                     pull-back camera move for gentle tones
//! offset/len·d             emotion beat at each keyword in the text
//! prompt_fraction·d        interactive prompt, if declared
//! d + tail_padding         total duration
//! ```

use glam::Vec3;
use oldtom_audio::{AudioCategory, AudioResource, Emotion, EnvironmentKind};
use serde::{Deserialize, Serialize};

use crate::capability::ResolvedNarration;
use crate::content::SegmentDescriptor;
use crate::effects::{CameraPose, EffectParams, EffectTag, SceneTag, TrackDescriptor};
use crate::timeline::TimelineConfig;

/// Words that mark an emotional beat in the narration text
const EMOTION_KEYWORDS: &[(&str, Emotion)] = &[
    ("amazing", Emotion::Wonder),
    ("magical", Emotion::Wonder),
    ("wonder", Emotion::Wonder),
    ("suddenly", Emotion::Excitement),
    ("burst", Emotion::Excitement),
    ("leapt", Emotion::Excitement),
    ("gently", Emotion::Gentle),
    ("softly", Emotion::Gentle),
    ("quiet", Emotion::Calm),
    ("calm", Emotion::Calm),
    ("storm", Emotion::Tension),
    ("dark", Emotion::Fear),
    ("afraid", Emotion::Fear),
    ("sad", Emotion::Sadness),
    ("lonely", Emotion::Sadness),
    ("laughed", Emotion::Joy),
    ("happy", Emotion::Joy),
    ("curious", Emotion::Curiosity),
    ("wondered", Emotion::Curiosity),
];

/// The narration voice track
#[derive(Debug, Clone)]
pub struct NarrationTrack {
    pub id: String,
    pub resource: AudioResource,
    pub start_offset: f64,
    /// Seconds
    pub duration: f64,
    pub volume: f32,
    pub fade_in: f32,
    pub fade_out: f32,
}

/// A background ambience or music track
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub id: String,
    pub category: AudioCategory,
    /// `None` when preloading failed; the track is skipped at play time
    pub resource: Option<AudioResource>,
    pub start_offset: f64,
    /// Seconds the track plays for
    pub duration: f64,
    pub volume: f32,
    pub fade_in: f32,
    pub fade_out: f32,
    pub looping: bool,
    pub position: Option<Vec3>,
    pub max_distance: f32,
}

impl AudioTrack {
    pub fn from_descriptor(
        descriptor: &TrackDescriptor,
        resource: Option<AudioResource>,
        duration: f64,
        config: &TimelineConfig,
    ) -> Self {
        Self {
            id: descriptor.id.clone(),
            category: descriptor.category,
            resource,
            start_offset: 0.0,
            duration,
            volume: descriptor.volume,
            fade_in: config.track_fade_in,
            fade_out: config.track_fade_out,
            looping: descriptor.looping,
            position: descriptor.position,
            max_distance: descriptor.max_distance,
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.position.is_some()
    }
}

/// A visual state the renderer should move to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualKeyframe {
    /// Seconds from segment start
    pub time: f64,
    pub scene: Option<SceneTag>,
    pub camera: Option<CameraPose>,
    #[serde(default)]
    pub effects: Vec<EffectTag>,
    pub emotion: Option<Emotion>,
}

/// Broad class of a sync event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEventKind {
    Visual,
    Audio,
    Interaction,
    Emotion,
}

/// What a sync event asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SyncAction {
    TriggerEffect {
        effect: EffectTag,
        params: EffectParams,
    },
    /// Short synthesized sound accompanying an effect
    PlaySound {
        effect: EffectTag,
        frequency: f32,
        duration: f32,
        position: Vec3,
        volume: f32,
    },
    EmotionBeat { emotion: Emotion, keyword: String },
    InteractivePrompt { interaction: String },
}

impl SyncAction {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            SyncAction::TriggerEffect { .. } => SyncEventKind::Visual,
            SyncAction::PlaySound { .. } => SyncEventKind::Audio,
            SyncAction::EmotionBeat { .. } => SyncEventKind::Emotion,
            SyncAction::InteractivePrompt { .. } => SyncEventKind::Interaction,
        }
    }
}

/// A discrete one-time trigger on the segment clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Unique within the segment
    pub id: String,
    /// Seconds from segment start
    pub timestamp: f64,
    #[serde(flatten)]
    pub action: SyncAction,
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        self.action.kind()
    }
}

/// Everything needed to play one segment
#[derive(Debug, Clone)]
pub struct SynchronizedSegment {
    pub id: String,
    pub scene: SceneTag,
    pub tone: Emotion,
    pub environment: EnvironmentKind,
    pub narration: NarrationTrack,
    pub tracks: Vec<AudioTrack>,
    /// Sorted by time
    pub keyframes: Vec<VisualKeyframe>,
    /// Sorted by timestamp
    pub events: Vec<SyncEvent>,
    /// Seconds
    pub total_duration: f64,
}

fn effect_sound(effect: EffectTag) -> Option<(f32, f32, Vec3, f32)> {
    match effect {
        EffectTag::Splash => Some((520.0, 0.8, Vec3::new(2.0, 0.0, -6.0), 0.7)),
        EffectTag::Spout => Some((180.0, 1.5, Vec3::new(-3.0, 1.0, -12.0), 0.8)),
        EffectTag::Lightning => Some((60.0, 2.0, Vec3::new(0.0, 30.0, -50.0), 0.9)),
        EffectTag::Bubbles => Some((900.0, 1.2, Vec3::new(0.0, -1.0, -3.0), 0.4)),
        _ => None,
    }
}

/// Keyword hits as (byte offset, keyword, emotion)
fn emotion_beats(text: &str) -> Vec<(usize, String, Emotion)> {
    let mut beats = Vec::new();
    let mut offset = 0;
    for word in text.split_inclusive(char::is_whitespace) {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_lowercase();
        if let Some((keyword, emotion)) = EMOTION_KEYWORDS.iter().find(|(k, _)| *k == cleaned) {
            beats.push((offset, keyword.to_string(), *emotion));
        }
        offset += word.len();
    }
    beats
}

impl SynchronizedSegment {
    /// Derive the full timeline for `descriptor`
    pub fn derive(
        descriptor: &SegmentDescriptor,
        narration: ResolvedNarration,
        tracks: Vec<AudioTrack>,
        config: &TimelineConfig,
    ) -> Self {
        let d = narration.duration.max(0.0);
        let camera = descriptor.scene.camera();

        let mut keyframes = vec![VisualKeyframe {
            time: 0.0,
            scene: Some(descriptor.scene),
            camera: Some(camera),
            effects: Vec::new(),
            emotion: Some(descriptor.tone),
        }];
        let mut events = Vec::new();

        let n = descriptor.effects.len();
        for (i, effect) in descriptor.effects.iter().enumerate() {
            let time = (i + 1) as f64 * d / (n + 1) as f64;
            keyframes.push(VisualKeyframe {
                time,
                scene: None,
                camera: None,
                effects: vec![*effect],
                emotion: None,
            });
            events.push(SyncEvent {
                id: format!("effect-{i}"),
                timestamp: time,
                action: SyncAction::TriggerEffect {
                    effect: *effect,
                    params: effect.params(),
                },
            });
            if let Some((frequency, duration, position, volume)) = effect_sound(*effect) {
                events.push(SyncEvent {
                    id: format!("effect-sound-{i}"),
                    timestamp: time,
                    action: SyncAction::PlaySound {
                        effect: *effect,
                        frequency,
                        duration,
                        position,
                        volume,
                    },
                });
            }
        }

        match descriptor.tone {
            tone if tone.is_energetic() => {
                for (fraction, push) in [(0.25, 0.25), (0.6, 0.45)] {
                    keyframes.push(VisualKeyframe {
                        time: d * fraction,
                        scene: None,
                        camera: Some(camera.pushed_in(push)),
                        effects: Vec::new(),
                        emotion: Some(tone),
                    });
                }
            }
            Emotion::Gentle | Emotion::Calm => {
                keyframes.push(VisualKeyframe {
                    time: d * 0.5,
                    scene: None,
                    camera: Some(camera.pulled_back(0.2)),
                    effects: Vec::new(),
                    emotion: Some(descriptor.tone),
                });
            }
            _ => {}
        }

        let text_len = descriptor.text.len().max(1) as f64;
        for (i, (offset, keyword, emotion)) in emotion_beats(&descriptor.text).into_iter().enumerate() {
            events.push(SyncEvent {
                id: format!("beat-{i}"),
                timestamp: offset as f64 / text_len * d,
                action: SyncAction::EmotionBeat { emotion, keyword },
            });
        }

        if let Some(interaction) = &descriptor.interactive {
            events.push(SyncEvent {
                id: format!("prompt-{interaction}"),
                timestamp: d * config.prompt_fraction.clamp(0.0, 1.0),
                action: SyncAction::InteractivePrompt {
                    interaction: interaction.clone(),
                },
            });
        }

        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        Self {
            id: descriptor.id.clone(),
            scene: descriptor.scene,
            tone: descriptor.tone,
            environment: descriptor.scene.environment(),
            narration: NarrationTrack {
                id: format!("narration:{}", descriptor.id),
                resource: narration.resource,
                start_offset: 0.0,
                duration: d,
                volume: config.narration_volume,
                fade_in: config.narration_fade_in,
                fade_out: config.narration_fade_out,
            },
            tracks,
            keyframes,
            events,
            total_duration: d + config.tail_padding.max(0.0),
        }
    }

    /// Fraction of the total duration covered by `elapsed` (0.0 to 1.0)
    pub fn progress(&self, elapsed: f64) -> f64 {
        if self.total_duration <= 0.0 {
            return 1.0;
        }
        (elapsed / self.total_duration).clamp(0.0, 1.0)
    }

    /// Index of the latest keyframe at or before `elapsed`
    pub fn keyframe_at(&self, elapsed: f64) -> Option<usize> {
        self.keyframes
            .iter()
            .rposition(|k| k.time <= elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SoundscapeTag;

    fn narration(duration: f64) -> ResolvedNarration {
        ResolvedNarration {
            resource: AudioResource::pcm("n", vec![0.0; 10], 10, 1),
            duration,
            measured: true,
            cached: false,
        }
    }

    fn descriptor() -> SegmentDescriptor {
        SegmentDescriptor::new(
            "c1-s2",
            SceneTag::OpenOcean,
            "Suddenly a great spout burst from the sea, and the children laughed.",
        )
        .with_tone(Emotion::Excitement)
        .with_effect(EffectTag::Spout)
        .with_effect(EffectTag::Splash)
        .with_effect(EffectTag::Mist)
        .with_soundscape(SoundscapeTag::Waves)
        .with_interactive("count-the-spouts")
    }

    #[test]
    fn effects_are_evenly_spaced() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(12.0), Vec::new(), &TimelineConfig::default());
        let times: Vec<f64> = segment
            .events
            .iter()
            .filter(|e| matches!(e.action, SyncAction::TriggerEffect { .. }))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(times, vec![3.0, 6.0, 9.0]);
        assert_eq!(segment.total_duration, 14.0);
    }

    #[test]
    fn opening_keyframe_and_energetic_moves() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(12.0), Vec::new(), &TimelineConfig::default());
        let first = &segment.keyframes[0];
        assert_eq!(first.time, 0.0);
        assert_eq!(first.scene, Some(SceneTag::OpenOcean));
        assert_eq!(first.camera, Some(SceneTag::OpenOcean.camera()));
        // opening + 3 effects + 2 push-ins
        assert_eq!(segment.keyframes.len(), 6);
        assert!(segment
            .keyframes
            .windows(2)
            .all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn beats_follow_keyword_position() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(12.0), Vec::new(), &TimelineConfig::default());
        let beats: Vec<(&str, f64)> = segment
            .events
            .iter()
            .filter_map(|e| match &e.action {
                SyncAction::EmotionBeat { keyword, .. } => Some((keyword.as_str(), e.timestamp)),
                _ => None,
            })
            .collect();
        assert_eq!(beats.len(), 3);
        assert_eq!(beats[0], ("suddenly", 0.0));
        assert_eq!(beats[1].0, "burst");
        assert_eq!(beats[2].0, "laughed");
        assert!(beats[1].1 < beats[2].1 && beats[2].1 < 12.0);
    }

    #[test]
    fn interactive_prompt_near_the_end() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(10.0), Vec::new(), &TimelineConfig::default());
        let prompts: Vec<&SyncEvent> = segment
            .events
            .iter()
            .filter(|e| e.kind() == SyncEventKind::Interaction)
            .collect();
        assert_eq!(prompts.len(), 1);
        assert!((prompts[0].timestamp - 8.0).abs() < 1e-9);
    }

    #[test]
    fn event_ids_are_unique() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(12.0), Vec::new(), &TimelineConfig::default());
        let mut ids: Vec<&str> = segment.events.iter().map(|e| e.id.as_str()).collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn keyframe_lookup() {
        let segment =
            SynchronizedSegment::derive(&descriptor(), narration(12.0), Vec::new(), &TimelineConfig::default());
        assert_eq!(segment.keyframe_at(0.0), Some(0));
        assert_eq!(segment.keyframe_at(100.0), Some(segment.keyframes.len() - 1));
        assert!((segment.progress(7.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sync_event_serializes_flat() {
        let event = SyncEvent {
            id: "prompt-x".into(),
            timestamp: 1.0,
            action: SyncAction::InteractivePrompt {
                interaction: "x".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "interactive-prompt");
        assert_eq!(json["interaction"], "x");
    }
}
