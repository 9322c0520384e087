//! Narrative content records
//!
//! Content is static and read-only: an ordered list of segment descriptors
//! loaded from JSON or TOML. Loading validates tags and ids up front.

use std::collections::HashSet;

use oldtom_audio::Emotion;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::capability::VoiceProfile;
use crate::effects::{EffectTag, SceneTag, SoundscapeTag};
use crate::error::{Error, Result};

/// One narrated unit as authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub id: String,
    #[serde(default)]
    pub chapter: String,
    pub scene: SceneTag,
    pub text: String,
    /// Emotional tone ("excited", "gentle", ...)
    #[serde(default, deserialize_with = "tone_tag")]
    pub tone: Emotion,
    #[serde(default)]
    pub soundscape: Vec<SoundscapeTag>,
    #[serde(default)]
    pub effects: Vec<EffectTag>,
    /// Interactive moment offered near the end of the segment
    #[serde(default)]
    pub interactive: Option<String>,
    /// Overrides the content's narrator voice
    #[serde(default)]
    pub voice: Option<VoiceProfile>,
}

fn tone_tag<'de, D>(deserializer: D) -> std::result::Result<Emotion, D::Error>
where
    D: Deserializer<'de>,
{
    let tag = String::deserialize(deserializer)?;
    Emotion::from_tag(&tag)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown tone '{tag}'")))
}

impl SegmentDescriptor {
    pub fn new(id: impl Into<String>, scene: SceneTag, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chapter: String::new(),
            scene,
            text: text.into(),
            tone: Emotion::default(),
            soundscape: Vec::new(),
            effects: Vec::new(),
            interactive: None,
            voice: None,
        }
    }

    pub fn with_tone(mut self, tone: Emotion) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_effect(mut self, effect: EffectTag) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_soundscape(mut self, tag: SoundscapeTag) -> Self {
        self.soundscape.push(tag);
        self
    }

    pub fn with_interactive(mut self, id: impl Into<String>) -> Self {
        self.interactive = Some(id.into());
        self
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Declared soundscape, or the scene's default when none is declared
    pub fn soundscape_tags(&self) -> Vec<SoundscapeTag> {
        if self.soundscape.is_empty() {
            self.scene.default_soundscape().to_vec()
        } else {
            self.soundscape.clone()
        }
    }
}

/// A chapter (or whole story) of segments in playback order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContent {
    pub title: String,
    /// Default narrator voice
    #[serde(default)]
    pub voice: VoiceProfile,
    pub segments: Vec<SegmentDescriptor>,
}

impl NarrativeContent {
    pub fn new(title: impl Into<String>, segments: Vec<SegmentDescriptor>) -> Result<Self> {
        let content = Self {
            title: title.into(),
            voice: VoiceProfile::default(),
            segments,
        };
        content.validate()?;
        Ok(content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let content: Self = serde_json::from_str(json)?;
        content.validate()?;
        Ok(content)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let content: Self = toml::from_str(text)?;
        content.validate()?;
        Ok(content)
    }

    fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(Error::InvalidContent(format!("'{}' has no segments", self.title)));
        }
        let mut seen = HashSet::new();
        for segment in &self.segments {
            if segment.id.trim().is_empty() {
                return Err(Error::InvalidContent("segment with empty id".into()));
            }
            if !seen.insert(segment.id.as_str()) {
                return Err(Error::InvalidContent(format!(
                    "duplicate segment id '{}'",
                    segment.id
                )));
            }
            if segment.text.trim().is_empty() {
                return Err(Error::InvalidContent(format!(
                    "segment '{}' has no text",
                    segment.id
                )));
            }
        }
        debug!("Loaded '{}' ({} segments)", self.title, self.segments.len());
        Ok(())
    }

    pub fn segment(&self, id: &str) -> Result<&SegmentDescriptor> {
        self.segments
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::SegmentNotFound(id.to_string()))
    }

    /// Index of a segment in playback order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&SegmentDescriptor> {
        self.segments.get(index)
    }

    /// Narrator voice for a segment
    pub fn voice_for(&self, segment: &SegmentDescriptor) -> VoiceProfile {
        segment.voice.clone().unwrap_or_else(|| self.voice.clone())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"{
        "title": "Chapter 1",
        "segments": [
            {
                "id": "c1-s1",
                "chapter": "chapter-1",
                "scene": "twofold-bay",
                "text": "Long ago, in the waters of Twofold Bay, lived a killer whale called Old Tom.",
                "tone": "gentle",
                "effects": ["mist"]
            },
            {
                "id": "c1-s2",
                "scene": "open-ocean",
                "text": "Suddenly a great spout burst from the sea!",
                "tone": "excited",
                "soundscape": ["waves", "adventure-theme"],
                "effects": ["spout", "splash"],
                "interactive": "count-the-spouts"
            }
        ]
    }"#;

    #[test]
    fn loads_and_validates_json() {
        let content = NarrativeContent::from_json(CHAPTER).unwrap();
        assert_eq!(content.len(), 2);
        let s2 = content.segment("c1-s2").unwrap();
        assert_eq!(s2.tone, Emotion::Excitement);
        assert_eq!(s2.effects, vec![EffectTag::Spout, EffectTag::Splash]);
        assert_eq!(content.position("c1-s2"), Some(1));
    }

    #[test]
    fn unknown_segment_is_not_found() {
        let content = NarrativeContent::from_json(CHAPTER).unwrap();
        assert!(matches!(content.segment("nope"), Err(Error::SegmentNotFound(_))));
    }

    #[test]
    fn unknown_tone_fails_at_load() {
        let json = CHAPTER.replace("\"gentle\"", "\"grumpy\"");
        assert!(matches!(
            NarrativeContent::from_json(&json),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = CHAPTER.replace("c1-s2", "c1-s1");
        assert!(matches!(
            NarrativeContent::from_json(&json),
            Err(Error::InvalidContent(_))
        ));
    }

    #[test]
    fn loads_toml() {
        let text = r#"
            title = "Chapter 2"

            [[segments]]
            id = "c2-s1"
            scene = "underwater"
            text = "Beneath the waves, Old Tom listened."
            tone = "mysterious"
        "#;
        let content = NarrativeContent::from_toml(text).unwrap();
        let segment = content.segment("c2-s1").unwrap();
        assert_eq!(segment.tone, Emotion::Wonder);
        assert_eq!(
            segment.soundscape_tags(),
            vec![SoundscapeTag::UnderwaterDrone, SoundscapeTag::WhaleSong]
        );
    }

    #[test]
    fn scene_default_soundscape_only_when_undeclared() {
        let segment = SegmentDescriptor::new("x", SceneTag::Storm, "Rain.")
            .with_soundscape(SoundscapeTag::Lullaby);
        assert_eq!(segment.soundscape_tags(), vec![SoundscapeTag::Lullaby]);
    }
}
