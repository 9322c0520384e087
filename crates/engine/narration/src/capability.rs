//! External capabilities: voice synthesis, audio storage, background tracks
//!
//! The timeline never talks to a TTS provider or an object store directly.
//! Hosts plug implementations of these traits in; offline stand-ins live here
//! for tests and the headless player.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oldtom_audio::{AudioBuffer, AudioResource, BufferDecoder, DefaultDecoder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::content::SegmentDescriptor;
use crate::effects::TrackDescriptor;
use crate::error::{Error, Result};

/// Narrator voice settings passed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    pub voice_id: String,
    /// Speaking rate multiplier
    pub rate: f32,
    pub pitch: f32,
    /// Provider-specific stability (0.0 to 1.0)
    pub stability: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice_id: "narrator".to_string(),
            rate: 1.0,
            pitch: 1.0,
            stability: 0.5,
        }
    }
}

/// Text-to-speech provider
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Provider name for diagnostics
    fn name(&self) -> &str;

    /// Synthesize `text`; may take arbitrarily long
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<AudioResource>;
}

/// Generated-audio cache keyed by segment id
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Absence is a cache miss, not an error
    async fn get_cached(&self, segment_id: &str) -> Option<AudioResource>;

    async fn store(&self, segment_id: &str, resource: AudioResource) -> Result<AudioResource>;
}

/// Loads background track audio
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn load(&self, track: &TrackDescriptor) -> Result<AudioResource>;
}

/// In-memory [`AudioStore`]
#[derive(Debug, Default)]
pub struct MemoryAudioStore {
    entries: RwLock<HashMap<String, AudioResource>>,
}

impl MemoryAudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AudioStore for MemoryAudioStore {
    async fn get_cached(&self, segment_id: &str) -> Option<AudioResource> {
        self.entries.read().await.get(segment_id).cloned()
    }

    async fn store(&self, segment_id: &str, resource: AudioResource) -> Result<AudioResource> {
        self.entries
            .write()
            .await
            .insert(segment_id.to_string(), resource.clone());
        Ok(resource)
    }
}

/// Offline synthesizer producing a soft hum as long as the text would take to read
#[derive(Debug, Clone)]
pub struct OfflineSynthesizer {
    pub words_per_minute: f32,
    pub sample_rate: u32,
}

impl Default for OfflineSynthesizer {
    fn default() -> Self {
        Self {
            words_per_minute: 150.0,
            sample_rate: 8_000,
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for OfflineSynthesizer {
    fn name(&self) -> &str {
        "offline"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<AudioResource> {
        let words = text.split_whitespace().count();
        let rate = voice.rate.max(0.1);
        let seconds = estimate_duration(words, self.words_per_minute * rate) as f32;
        let buffer = AudioBuffer::tone(
            format!("narration:{}", voice.voice_id),
            140.0 * voice.pitch.max(0.1),
            seconds,
            self.sample_rate,
            0.2,
        );
        Ok(AudioResource::from(buffer))
    }
}

/// Offline track source synthesizing each track from its fundamental
#[derive(Debug, Clone)]
pub struct ToneTrackSource {
    pub sample_rate: u32,
    /// Loop length in seconds
    pub loop_length: f32,
}

impl Default for ToneTrackSource {
    fn default() -> Self {
        Self {
            sample_rate: 8_000,
            loop_length: 4.0,
        }
    }
}

#[async_trait]
impl TrackSource for ToneTrackSource {
    async fn load(&self, track: &TrackDescriptor) -> Result<AudioResource> {
        let buffer = AudioBuffer::tone(
            track.id.clone(),
            track.tone_hz,
            self.loop_length,
            self.sample_rate,
            0.0,
        );
        Ok(AudioResource::from(buffer))
    }
}

/// Reading time at `words_per_minute`, never shorter than a second
pub fn estimate_duration(words: usize, words_per_minute: f32) -> f64 {
    let wpm = f64::from(words_per_minute.max(1.0));
    (words as f64 / wpm * 60.0).max(1.0)
}

/// Narration audio ready to play
#[derive(Debug, Clone)]
pub struct ResolvedNarration {
    pub resource: AudioResource,
    /// Seconds
    pub duration: f64,
    /// Duration came from the decoded audio rather than an estimate
    pub measured: bool,
    /// Served from the store without synthesis
    pub cached: bool,
}

/// Cache lookup, then synthesis under a timeout, then store
pub struct NarrationResolver {
    synthesizer: Arc<dyn VoiceSynthesizer>,
    store: Arc<dyn AudioStore>,
    decoder: Box<dyn BufferDecoder>,
    timeout: Duration,
    words_per_minute: f32,
}

impl NarrationResolver {
    pub fn new(synthesizer: Arc<dyn VoiceSynthesizer>, store: Arc<dyn AudioStore>) -> Self {
        Self {
            synthesizer,
            store,
            decoder: Box::new(DefaultDecoder),
            timeout: Duration::from_secs(20),
            words_per_minute: 150.0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_words_per_minute(mut self, words_per_minute: f32) -> Self {
        self.words_per_minute = words_per_minute;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn BufferDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn resolve(
        &self,
        segment: &SegmentDescriptor,
        voice: &VoiceProfile,
    ) -> Result<ResolvedNarration> {
        let (resource, cached) = match self.store.get_cached(&segment.id).await {
            Some(resource) => {
                debug!("Narration for {} served from cache", segment.id);
                (resource, true)
            }
            None => {
                info!(
                    "Synthesizing narration for {} via {}",
                    segment.id,
                    self.synthesizer.name()
                );
                let synthesized = tokio::time::timeout(
                    self.timeout,
                    self.synthesizer.synthesize(&segment.text, voice),
                )
                .await
                .map_err(|_| Error::SynthesisTimeout(self.timeout))??;

                let resource = match self.store.store(&segment.id, synthesized.clone()).await {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!("Could not cache narration for {}: {}", segment.id, e);
                        synthesized
                    }
                };
                (resource, false)
            }
        };

        let (duration, measured) = match self.decoder.decode(&resource) {
            Ok(buffer) if buffer.duration() > 0.0 => (f64::from(buffer.duration()), true),
            Ok(_) => (self.estimate(segment), false),
            Err(e) => {
                warn!(
                    "Narration for {} not measurable ({}), estimating from text",
                    segment.id, e
                );
                (self.estimate(segment), false)
            }
        };

        Ok(ResolvedNarration {
            resource,
            duration,
            measured,
            cached,
        })
    }

    fn estimate(&self, segment: &SegmentDescriptor) -> f64 {
        estimate_duration(segment.word_count(), self.words_per_minute)
    }
}

impl std::fmt::Debug for NarrationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationResolver")
            .field("synthesizer", &self.synthesizer.name())
            .field("timeout", &self.timeout)
            .field("words_per_minute", &self.words_per_minute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SceneTag;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSynth {
        calls: AtomicUsize,
        inner: OfflineSynthesizer,
    }

    #[async_trait]
    impl VoiceSynthesizer for CountingSynth {
        fn name(&self) -> &str {
            "counting"
        }

        async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<AudioResource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.synthesize(text, voice).await
        }
    }

    struct StalledSynth;

    #[async_trait]
    impl VoiceSynthesizer for StalledSynth {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<AudioResource> {
            futures::future::pending::<()>().await;
            Err(Error::Synthesis("unreachable".into()))
        }
    }

    struct OpaqueSynth;

    #[async_trait]
    impl VoiceSynthesizer for OpaqueSynth {
        fn name(&self) -> &str {
            "opaque"
        }

        async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<AudioResource> {
            Ok(AudioResource::encoded("opaque.mp3", vec![0xFF, 0xFB, 0x90]))
        }
    }

    fn segment() -> SegmentDescriptor {
        SegmentDescriptor::new(
            "s1",
            SceneTag::TwofoldBay,
            "one two three four five six seven eight nine ten",
        )
    }

    #[tokio::test]
    async fn second_resolve_hits_the_cache() {
        let synth = Arc::new(CountingSynth {
            calls: AtomicUsize::new(0),
            inner: OfflineSynthesizer::default(),
        });
        let store = Arc::new(MemoryAudioStore::new());
        let resolver = NarrationResolver::new(synth.clone(), store.clone());

        let first = resolver.resolve(&segment(), &VoiceProfile::default()).await.unwrap();
        assert!(!first.cached);
        assert!(first.measured);
        // 10 words at 150 wpm
        assert!((first.duration - 4.0).abs() < 0.01);

        let second = resolver.resolve(&segment(), &VoiceProfile::default()).await.unwrap();
        assert!(second.cached);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_synthesis_times_out() {
        let resolver = NarrationResolver::new(Arc::new(StalledSynth), Arc::new(MemoryAudioStore::new()))
            .with_timeout(Duration::from_secs(5));
        let err = resolver
            .resolve(&segment(), &VoiceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SynthesisTimeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn undecodable_audio_falls_back_to_estimate() {
        let resolver = NarrationResolver::new(Arc::new(OpaqueSynth), Arc::new(MemoryAudioStore::new()))
            .with_words_per_minute(120.0);
        let narration = resolver
            .resolve(&segment(), &VoiceProfile::default())
            .await
            .unwrap();
        assert!(!narration.measured);
        assert!((narration.duration - 5.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_has_a_floor() {
        assert_eq!(estimate_duration(0, 150.0), 1.0);
        assert!((estimate_duration(300, 150.0) - 120.0).abs() < 1e-9);
    }
}
