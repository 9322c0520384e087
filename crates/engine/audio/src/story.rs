//! Story moments: timed audio cues and adaptive triggers
//!
//! A [`StoryMoment`] is authored content. Cues fire at fixed offsets from the
//! moment start; triggers fire whenever their condition holds, subject to a
//! cooldown and a maximum fire count. Guards and conditions are evaluated
//! against a [`MomentContext`] built at fire time.

use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::emotion::{Emotion, EmotionalState};
use crate::interaction::{InteractionHistory, InteractionKind};

/// What a cue does to its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CueAction {
    /// Fade the target layer in over its own fade time
    Play,
    /// Fade the target layer out over its own fade time
    Stop,
    FadeIn { duration: f32 },
    FadeOut { duration: f32 },
    /// Crossfade from the target layer to `to`
    Crossfade { to: String, duration: f32 },
    /// Glide the target emitter to `position`
    SpatialMove { position: Vec3, duration: f32 },
}

/// Live condition checked when a cue fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CueGuard {
    /// Current emotion matches with at least `min_intensity`
    Emotion {
        emotion: Emotion,
        #[serde(default)]
        min_intensity: f32,
    },
    /// An interaction of `kind` happened within the last `within` seconds
    Interaction { kind: InteractionKind, within: f64 },
    /// The user picked `option`
    Choice { option: String },
}

impl CueGuard {
    pub fn is_met(&self, ctx: &MomentContext<'_>) -> bool {
        match self {
            CueGuard::Emotion {
                emotion,
                min_intensity,
            } => ctx.emotion.primary == *emotion && ctx.emotion.intensity >= *min_intensity,
            CueGuard::Interaction { kind, within } => ctx
                .interactions
                .latest_of(*kind)
                .is_some_and(|e| ctx.now - e.timestamp <= *within),
            CueGuard::Choice { option } => ctx.choices.contains(option),
        }
    }
}

/// A timed action within a story moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCue {
    /// Seconds after the moment starts
    pub offset: f64,
    pub action: CueAction,
    /// Layer id (emitter id for spatial moves)
    pub target: String,
    #[serde(default)]
    pub guard: Option<CueGuard>,
}

impl AudioCue {
    pub fn new(offset: f64, action: CueAction, target: impl Into<String>) -> Self {
        Self {
            offset: offset.max(0.0),
            action,
            target: target.into(),
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: CueGuard) -> Self {
        self.guard = Some(guard);
        self
    }
}

/// Condition of an adaptive trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TriggerCondition {
    Emotion {
        emotion: Emotion,
        #[serde(default)]
        min_intensity: f32,
    },
    /// The most recent interaction is of `kind` and happened within `within` seconds
    Interaction {
        kind: InteractionKind,
        within: f64,
        #[serde(default)]
        min_intensity: f32,
    },
    /// At least `seconds` into the moment
    Elapsed { seconds: f64 },
    All { conditions: Vec<TriggerCondition> },
}

impl TriggerCondition {
    pub fn is_met(&self, ctx: &MomentContext<'_>) -> bool {
        match self {
            TriggerCondition::Emotion {
                emotion,
                min_intensity,
            } => ctx.emotion.primary == *emotion && ctx.emotion.intensity >= *min_intensity,
            TriggerCondition::Interaction {
                kind,
                within,
                min_intensity,
            } => ctx.interactions.latest().is_some_and(|e| {
                e.kind == *kind && ctx.now - e.timestamp <= *within && e.intensity >= *min_intensity
            }),
            TriggerCondition::Elapsed { seconds } => ctx.elapsed >= *seconds,
            TriggerCondition::All { conditions } => conditions.iter().all(|c| c.is_met(ctx)),
        }
    }
}

/// What a trigger does when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TriggerResponse {
    /// Ramp a layer's volume
    AdjustLayerVolume {
        layer: String,
        volume: f32,
        duration: f32,
    },
    /// Glide an emitter
    SpatialMove {
        emitter: String,
        position: Vec3,
        duration: f32,
    },
    /// Bring a silent layer in
    IntroduceTheme { layer: String },
    /// Short synthesized effect at a position
    OneShot {
        frequency: f32,
        duration: f32,
        position: Vec3,
        volume: f32,
    },
}

/// Conditional rule with cooldown and fire limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveTrigger {
    pub id: String,
    pub condition: TriggerCondition,
    pub response: TriggerResponse,
    /// Minimum seconds between firings
    #[serde(default)]
    pub cooldown: f64,
    #[serde(default)]
    pub max_fires: Option<u32>,
}

impl AdaptiveTrigger {
    pub fn new(id: impl Into<String>, condition: TriggerCondition, response: TriggerResponse) -> Self {
        Self {
            id: id.into(),
            condition,
            response,
            cooldown: 0.0,
            max_fires: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: f64) -> Self {
        self.cooldown = cooldown.max(0.0);
        self
    }

    pub fn with_max_fires(mut self, max_fires: u32) -> Self {
        self.max_fires = Some(max_fires);
        self
    }

    /// Whether bookkeeping allows another firing at `now`
    pub fn can_fire(&self, fired: u32, last_fired: Option<f64>, now: f64) -> bool {
        if self.max_fires.is_some_and(|max| fired >= max) {
            return false;
        }
        match last_fired {
            Some(last) => now - last >= self.cooldown,
            None => true,
        }
    }
}

/// One narrated unit's audio script
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryMoment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cues: Vec<AudioCue>,
    /// Expected total duration in seconds
    pub duration: f64,
    #[serde(default)]
    pub triggers: Vec<AdaptiveTrigger>,
}

impl StoryMoment {
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cues: Vec::new(),
            duration,
            triggers: Vec::new(),
        }
    }

    pub fn with_cue(mut self, cue: AudioCue) -> Self {
        self.cues.push(cue);
        self
    }

    pub fn with_trigger(mut self, trigger: AdaptiveTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Snapshot of live signals used to evaluate guards and conditions
#[derive(Debug, Clone, Copy)]
pub struct MomentContext<'a> {
    pub emotion: &'a EmotionalState,
    pub interactions: &'a InteractionHistory,
    pub choices: &'a HashSet<String>,
    /// Mixer time in seconds
    pub now: f64,
    /// Seconds since the moment started
    pub elapsed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionEvent;

    fn ctx<'a>(
        emotion: &'a EmotionalState,
        interactions: &'a InteractionHistory,
        choices: &'a HashSet<String>,
        now: f64,
    ) -> MomentContext<'a> {
        MomentContext {
            emotion,
            interactions,
            choices,
            now,
            elapsed: now,
        }
    }

    #[test]
    fn emotion_guard() {
        let emotion = EmotionalState::new(Emotion::Wonder, 0.7);
        let history = InteractionHistory::new(4);
        let choices = HashSet::new();
        let c = ctx(&emotion, &history, &choices, 0.0);

        let guard = CueGuard::Emotion {
            emotion: Emotion::Wonder,
            min_intensity: 0.5,
        };
        assert!(guard.is_met(&c));
        let guard = CueGuard::Emotion {
            emotion: Emotion::Wonder,
            min_intensity: 0.8,
        };
        assert!(!guard.is_met(&c));
    }

    #[test]
    fn interaction_guard_respects_window() {
        let emotion = EmotionalState::default();
        let mut history = InteractionHistory::new(4);
        history.record(InteractionEvent::voice(0.5).at(1.0));
        let choices = HashSet::new();
        let guard = CueGuard::Interaction {
            kind: InteractionKind::Voice,
            within: 2.0,
        };
        assert!(guard.is_met(&ctx(&emotion, &history, &choices, 2.5)));
        assert!(!guard.is_met(&ctx(&emotion, &history, &choices, 4.0)));
    }

    #[test]
    fn choice_guard() {
        let emotion = EmotionalState::default();
        let history = InteractionHistory::new(4);
        let mut choices = HashSet::new();
        let guard = CueGuard::Choice {
            option: "follow-tom".into(),
        };
        assert!(!guard.is_met(&ctx(&emotion, &history, &choices, 0.0)));
        choices.insert("follow-tom".to_string());
        assert!(guard.is_met(&ctx(&emotion, &history, &choices, 0.0)));
    }

    #[test]
    fn trigger_bookkeeping() {
        let trigger = AdaptiveTrigger::new(
            "swell",
            TriggerCondition::Elapsed { seconds: 1.0 },
            TriggerResponse::IntroduceTheme {
                layer: "music".into(),
            },
        )
        .with_cooldown(2.0)
        .with_max_fires(2);

        assert!(trigger.can_fire(0, None, 0.0));
        assert!(!trigger.can_fire(1, Some(1.0), 2.0));
        assert!(trigger.can_fire(1, Some(1.0), 3.0));
        assert!(!trigger.can_fire(2, Some(1.0), 10.0));
    }

    #[test]
    fn compound_condition() {
        let emotion = EmotionalState::new(Emotion::Excitement, 0.9);
        let history = InteractionHistory::new(4);
        let choices = HashSet::new();
        let condition = TriggerCondition::All {
            conditions: vec![
                TriggerCondition::Elapsed { seconds: 3.0 },
                TriggerCondition::Emotion {
                    emotion: Emotion::Excitement,
                    min_intensity: 0.5,
                },
            ],
        };
        assert!(!condition.is_met(&ctx(&emotion, &history, &choices, 2.0)));
        assert!(condition.is_met(&ctx(&emotion, &history, &choices, 3.0)));
    }

    #[test]
    fn moment_from_json() {
        let json = r#"{
            "id": "arrival",
            "name": "Old Tom arrives",
            "duration": 20.0,
            "cues": [
                { "offset": 0.0, "action": { "type": "play" }, "target": "ocean" },
                { "offset": 4.0, "action": { "type": "crossfade", "to": "theme", "duration": 2.0 },
                  "target": "ocean", "guard": { "type": "choice", "option": "listen" } }
            ]
        }"#;
        let moment: StoryMoment = serde_json::from_str(json).unwrap();
        assert_eq!(moment.cues.len(), 2);
        assert!(moment.cues[1].guard.is_some());
        assert!(moment.triggers.is_empty());
    }
}
