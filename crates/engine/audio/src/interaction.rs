//! User interaction events reported by the host

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Interaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Touch,
    Voice,
    Gesture,
    Gaze,
    Choice,
}

/// One user interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub position: Option<Vec3>,
    /// Intensity (0.0 to 1.0)
    pub intensity: f32,
    /// Duration in seconds
    pub duration: f32,
    pub target: Option<String>,
    #[serde(default)]
    pub context: String,
    /// Logical time in seconds
    pub timestamp: f64,
}

impl InteractionEvent {
    pub fn new(kind: InteractionKind, intensity: f32) -> Self {
        Self {
            kind,
            position: None,
            intensity: intensity.clamp(0.0, 1.0),
            duration: 0.0,
            target: None,
            context: String::new(),
            timestamp: 0.0,
        }
    }

    pub fn touch(position: Vec3, intensity: f32) -> Self {
        Self::new(InteractionKind::Touch, intensity).at_position(position)
    }

    pub fn voice(intensity: f32) -> Self {
        Self::new(InteractionKind::Voice, intensity)
    }

    /// A story choice; `target` carries the chosen option id
    pub fn choice(option: impl Into<String>) -> Self {
        Self::new(InteractionKind::Choice, 1.0).with_target(option)
    }

    pub fn at_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration.max(0.0);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Bounded rolling history, oldest evicted first
#[derive(Debug, Clone)]
pub struct InteractionHistory {
    events: VecDeque<InteractionEvent>,
    capacity: usize,
}

impl InteractionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, event: InteractionEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn latest(&self) -> Option<&InteractionEvent> {
        self.events.back()
    }

    /// Most recent event of a kind
    pub fn latest_of(&self, kind: InteractionKind) -> Option<&InteractionEvent> {
        self.events.iter().rev().find(|e| e.kind == kind)
    }

    /// Events at or after `since`
    pub fn count_since(&self, kind: InteractionKind, since: f64) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == kind && e.timestamp >= since)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InteractionEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_evicts_oldest() {
        let mut history = InteractionHistory::new(2);
        history.record(InteractionEvent::voice(0.1).at(1.0));
        history.record(InteractionEvent::voice(0.2).at(2.0));
        history.record(InteractionEvent::touch(Vec3::ONE, 0.3).at(3.0));
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().timestamp, 2.0);
        assert_eq!(history.latest().unwrap().kind, InteractionKind::Touch);
    }

    #[test]
    fn queries_by_kind() {
        let mut history = InteractionHistory::new(10);
        history.record(InteractionEvent::voice(0.5).at(1.0));
        history.record(InteractionEvent::touch(Vec3::ZERO, 0.5).at(2.0));
        history.record(InteractionEvent::voice(0.9).at(3.0));
        assert_eq!(history.latest_of(InteractionKind::Voice).unwrap().intensity, 0.9);
        assert_eq!(history.count_since(InteractionKind::Voice, 2.0), 1);
        assert!(history.latest_of(InteractionKind::Gaze).is_none());
    }

    #[test]
    fn intensity_clamped() {
        assert_eq!(InteractionEvent::voice(4.0).intensity, 1.0);
    }
}
