//! Emotional state tracking
//!
//! The host reports how the listener seems to feel; the tracker keeps a
//! bounded history and a smoothed "current" state so that the mix never
//! jumps when a new reading arrives.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Primary emotion labels understood by layer triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Emotion {
    Wonder,
    Excitement,
    #[default]
    Calm,
    Sadness,
    Fear,
    Joy,
    Curiosity,
    Tension,
    Gentle,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Wonder => "wonder",
            Emotion::Excitement => "excitement",
            Emotion::Calm => "calm",
            Emotion::Sadness => "sadness",
            Emotion::Fear => "fear",
            Emotion::Joy => "joy",
            Emotion::Curiosity => "curiosity",
            Emotion::Tension => "tension",
            Emotion::Gentle => "gentle",
        }
    }

    /// Parse a content tone tag ("excited", "gentle", ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        let emotion = match tag.trim().to_ascii_lowercase().as_str() {
            "wonder" | "awe" | "mysterious" => Emotion::Wonder,
            "excitement" | "excited" | "exciting" | "dramatic" => Emotion::Excitement,
            "calm" | "peaceful" | "neutral" => Emotion::Calm,
            "sadness" | "sad" | "melancholy" => Emotion::Sadness,
            "fear" | "scared" | "scary" => Emotion::Fear,
            "joy" | "happy" | "joyful" => Emotion::Joy,
            "curiosity" | "curious" => Emotion::Curiosity,
            "tension" | "tense" | "suspense" => Emotion::Tension,
            "gentle" | "tender" | "soft" => Emotion::Gentle,
            _ => return None,
        };
        Some(emotion)
    }

    /// High-energy emotions drive faster tempo and wider movement
    pub fn is_energetic(&self) -> bool {
        matches!(
            self,
            Emotion::Excitement | Emotion::Joy | Emotion::Fear | Emotion::Tension
        )
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emotional reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub primary: Emotion,
    /// Intensity (0.0 to 1.0)
    pub intensity: f32,
    /// Confidence of the reading (0.0 to 1.0)
    pub confidence: f32,
    /// Logical time of the reading in seconds
    pub timestamp: f64,
    /// Free-text context tag
    #[serde(default)]
    pub context: String,
}

impl EmotionalState {
    pub fn new(primary: Emotion, intensity: f32) -> Self {
        Self {
            primary,
            intensity: intensity.clamp(0.0, 1.0),
            confidence: 1.0,
            timestamp: 0.0,
            context: String::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self::new(Emotion::Calm, 0.5)
    }
}

/// Smoothed current state plus a bounded history of raw readings
#[derive(Debug, Clone)]
pub struct EmotionTracker {
    current: EmotionalState,
    history: VecDeque<EmotionalState>,
    capacity: usize,
    smoothing: f32,
}

impl EmotionTracker {
    /// `smoothing` is the fraction of the distance to each new reading
    /// covered per update (clamped into (0, 1])
    pub fn new(smoothing: f32, capacity: usize) -> Self {
        Self {
            current: EmotionalState::default(),
            history: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            smoothing: smoothing.clamp(f32::EPSILON, 1.0),
        }
    }

    /// Blend a new reading into the current state and return the result
    pub fn update(&mut self, reading: EmotionalState) -> &EmotionalState {
        let factor = self.smoothing;
        let blend = |from: f32, to: f32| from + (to - from) * factor;

        self.current = EmotionalState {
            primary: reading.primary,
            intensity: blend(self.current.intensity, reading.intensity).clamp(0.0, 1.0),
            confidence: blend(self.current.confidence, reading.confidence).clamp(0.0, 1.0),
            timestamp: reading.timestamp,
            context: reading.context.clone(),
        };
        trace!(
            "Emotion {} -> {:.2} (reported {:.2})",
            self.current.primary,
            self.current.intensity,
            reading.intensity
        );

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(reading);
        &self.current
    }

    pub fn current(&self) -> &EmotionalState {
        &self.current
    }

    /// Raw readings, oldest first
    pub fn history(&self) -> impl Iterator<Item = &EmotionalState> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Most frequent primary emotion in the history
    pub fn dominant(&self) -> Option<Emotion> {
        let mut counts: Vec<(Emotion, usize)> = Vec::new();
        for state in &self.history {
            match counts.iter_mut().find(|(e, _)| *e == state.primary) {
                Some((_, n)) => *n += 1,
                None => counts.push((state.primary, 1)),
            }
        }
        counts.into_iter().max_by_key(|(_, n)| *n).map(|(e, _)| e)
    }

    pub fn reset(&mut self) {
        self.current = EmotionalState::default();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_moves_part_of_the_way() {
        let mut tracker = EmotionTracker::new(0.3, 10);
        let state = tracker.update(EmotionalState::new(Emotion::Excitement, 1.0));
        assert_eq!(state.primary, Emotion::Excitement);
        assert!((state.intensity - 0.65).abs() < 1e-6);
    }

    #[test]
    fn smoothing_never_overshoots_downward() {
        let mut tracker = EmotionTracker::new(0.3, 10);
        for _ in 0..5 {
            tracker.update(EmotionalState::new(Emotion::Joy, 0.9));
        }
        let before = tracker.current().intensity;
        let after = tracker.update(EmotionalState::new(Emotion::Sadness, 0.1)).intensity;
        assert!(after < before && after > 0.1);
    }

    #[test]
    fn history_is_bounded() {
        let mut tracker = EmotionTracker::new(0.3, 3);
        for i in 0..5 {
            tracker.update(EmotionalState::new(Emotion::Calm, 0.5).at(i as f64));
        }
        assert_eq!(tracker.history_len(), 3);
        assert_eq!(tracker.history().next().unwrap().timestamp, 2.0);
    }

    #[test]
    fn dominant_emotion() {
        let mut tracker = EmotionTracker::new(0.3, 10);
        tracker.update(EmotionalState::new(Emotion::Wonder, 0.5));
        tracker.update(EmotionalState::new(Emotion::Fear, 0.5));
        tracker.update(EmotionalState::new(Emotion::Wonder, 0.5));
        assert_eq!(tracker.dominant(), Some(Emotion::Wonder));
    }

    #[test]
    fn tone_tags() {
        assert_eq!(Emotion::from_tag("Excited"), Some(Emotion::Excitement));
        assert_eq!(Emotion::from_tag("gentle"), Some(Emotion::Gentle));
        assert_eq!(Emotion::from_tag("bored"), None);
    }
}
