//! Decoded audio buffers and resource decoding
//!
//! Decoded buffers are immutable and shared behind `Arc`, so any number of
//! emitters can reference the same waves recording without copying it.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Error, Result};
use tracing::{debug, trace};

/// Immutable decoded audio data
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Unique identifier
    id: u64,
    /// Display name (usually the resource key)
    name: String,
    /// Interleaved samples in [-1.0, 1.0]
    samples: Vec<f32>,
    /// Sample rate
    sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    channels: u16,
    /// Duration in seconds
    duration: f32,
}

impl AudioBuffer {
    /// Create a buffer from raw interleaved samples
    pub fn from_samples(
        name: impl Into<String>,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let frames = sample_rate as f32 * channels.max(1) as f32;
        let duration = if frames > 0.0 {
            samples.len() as f32 / frames
        } else {
            0.0
        };

        Self {
            id,
            name: name.into(),
            samples,
            sample_rate,
            channels,
            duration,
        }
    }

    /// Synthesize a decaying mono sine tone (interaction feedback sounds)
    pub fn tone(
        name: impl Into<String>,
        frequency: f32,
        duration: f32,
        sample_rate: u32,
        decay: f32,
    ) -> Self {
        let count = (duration.max(0.0) * sample_rate as f32) as usize;
        let step = std::f32::consts::TAU * frequency / sample_rate as f32;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (step * i as f32).sin() * (-decay * t).exp()
            })
            .collect();
        Self::from_samples(name, samples, sample_rate, 1)
    }

    /// Mono silence of the given length
    pub fn silence(name: impl Into<String>, duration: f32, sample_rate: u32) -> Self {
        let count = (duration.max(0.0) * sample_rate as f32) as usize;
        Self::from_samples(name, vec![0.0; count], sample_rate, 1)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Check if this is a mono buffer (better for spatial audio)
    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// Something that can be turned into an [`AudioBuffer`]
#[derive(Debug, Clone)]
pub enum AudioResource {
    /// Raw interleaved PCM
    Pcm {
        key: String,
        samples: Arc<Vec<f32>>,
        sample_rate: u32,
        channels: u16,
    },
    /// Container bytes (WAV; OGG/MP3/FLAC with the `native` feature)
    Encoded { key: String, bytes: Arc<Vec<u8>> },
    /// Already decoded and shared
    Decoded(Arc<AudioBuffer>),
}

impl AudioResource {
    pub fn pcm(key: impl Into<String>, samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        AudioResource::Pcm {
            key: key.into(),
            samples: Arc::new(samples),
            sample_rate,
            channels,
        }
    }

    pub fn encoded(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        AudioResource::Encoded {
            key: key.into(),
            bytes: Arc::new(bytes),
        }
    }

    /// Cache key for this resource
    pub fn key(&self) -> &str {
        match self {
            AudioResource::Pcm { key, .. } | AudioResource::Encoded { key, .. } => key,
            AudioResource::Decoded(buffer) => buffer.name(),
        }
    }
}

impl From<Arc<AudioBuffer>> for AudioResource {
    fn from(buffer: Arc<AudioBuffer>) -> Self {
        AudioResource::Decoded(buffer)
    }
}

impl From<AudioBuffer> for AudioResource {
    fn from(buffer: AudioBuffer) -> Self {
        AudioResource::Decoded(Arc::new(buffer))
    }
}

/// Turns resources into shared decoded buffers
pub trait BufferDecoder: Send + Sync {
    fn decode(&self, resource: &AudioResource) -> Result<Arc<AudioBuffer>>;
}

/// Decoder used unless the host supplies its own
///
/// - PCM and pre-decoded resources always succeed
/// - WAV containers are parsed with `hound`
/// - Compressed formats go through `rodio` when the `native` feature is on
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecoder;

impl DefaultDecoder {
    fn decode_wav(key: &str, bytes: &[u8]) -> Result<AudioBuffer> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| Error::Resource(format!("{key}: {e}")))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Resource(format!("{key}: {e}")))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::Resource(format!("{key}: {e}")))?
            }
        };

        Ok(AudioBuffer::from_samples(
            key,
            samples,
            spec.sample_rate,
            spec.channels,
        ))
    }

    #[cfg(feature = "native")]
    fn decode_native(key: &str, bytes: &[u8]) -> Result<AudioBuffer> {
        use rodio::Source;

        let decoder = rodio::Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| Error::Resource(format!("{key}: failed to decode: {e}")))?;

        let sample_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let samples: Vec<f32> = decoder.map(|s| s as f32 / i16::MAX as f32).collect();

        Ok(AudioBuffer::from_samples(key, samples, sample_rate, channels))
    }
}

impl BufferDecoder for DefaultDecoder {
    fn decode(&self, resource: &AudioResource) -> Result<Arc<AudioBuffer>> {
        match resource {
            AudioResource::Decoded(buffer) => Ok(Arc::clone(buffer)),
            AudioResource::Pcm {
                key,
                samples,
                sample_rate,
                channels,
            } => {
                if *sample_rate == 0 || *channels == 0 {
                    return Err(Error::Resource(format!(
                        "{key}: invalid PCM layout ({sample_rate} Hz, {channels} ch)"
                    )));
                }
                Ok(Arc::new(AudioBuffer::from_samples(
                    key.clone(),
                    samples.as_ref().clone(),
                    *sample_rate,
                    *channels,
                )))
            }
            AudioResource::Encoded { key, bytes } => {
                let wav = Self::decode_wav(key, bytes);

                #[cfg(feature = "native")]
                let wav = wav.or_else(|_| Self::decode_native(key, bytes));

                wav.map(Arc::new)
            }
        }
    }
}

/// Decode-once cache of shared buffers keyed by resource key
pub struct BufferCache {
    decoder: Box<dyn BufferDecoder>,
    buffers: HashMap<String, Arc<AudioBuffer>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::with_decoder(Box::new(DefaultDecoder))
    }

    pub fn with_decoder(decoder: Box<dyn BufferDecoder>) -> Self {
        Self {
            decoder,
            buffers: HashMap::new(),
        }
    }

    /// Return the shared buffer for `resource`, decoding it on first use
    pub fn get_or_decode(&mut self, resource: &AudioResource) -> Result<Arc<AudioBuffer>> {
        if let AudioResource::Decoded(buffer) = resource {
            return Ok(Arc::clone(buffer));
        }
        if let Some(buffer) = self.buffers.get(resource.key()) {
            trace!("Buffer cache hit: {}", resource.key());
            return Ok(Arc::clone(buffer));
        }

        let buffer = self.decoder.decode(resource)?;
        debug!(
            "Decoded {} ({:.2}s, {} Hz, {} ch)",
            resource.key(),
            buffer.duration(),
            buffer.sample_rate(),
            buffer.channels()
        );
        self.buffers
            .insert(resource.key().to_string(), Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Drop buffers no emitter references any more
    pub fn evict_unused(&mut self) -> usize {
        let before = self.buffers.len();
        self.buffers.retain(|_, buffer| Arc::strong_count(buffer) > 1);
        before - self.buffers.len()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for BufferCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn buffer_duration_from_samples() {
        let buffer = AudioBuffer::from_samples("test", vec![0.0; 88200], 44100, 2);
        assert!((buffer.duration() - 1.0).abs() < 0.001);
        assert!(!buffer.is_mono());
    }

    #[test]
    fn tone_decays() {
        let tone = AudioBuffer::tone("ping", 880.0, 0.5, 8000, 6.0);
        assert!(tone.is_mono());
        assert!((tone.duration() - 0.5).abs() < 0.01);
        let head = &tone.samples()[..400];
        let tail = &tone.samples()[3600..];
        let peak = |s: &[f32]| s.iter().fold(0.0f32, |a, v| a.max(v.abs()));
        assert!(peak(head) > peak(tail));
    }

    #[test]
    fn decodes_wav_container() {
        let bytes = wav_bytes(&[0, i16::MAX / 2, -i16::MAX / 2, 0], 8000);
        let buffer = DefaultDecoder
            .decode(&AudioResource::encoded("clip.wav", bytes))
            .unwrap();
        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.samples().len(), 4);
        assert!((buffer.samples()[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn garbage_bytes_are_a_resource_error() {
        let result = DefaultDecoder.decode(&AudioResource::encoded("bad", vec![1, 2, 3]));
        assert!(matches!(result, Err(Error::Resource(_))));
    }

    #[test]
    fn invalid_pcm_layout_rejected() {
        let result = DefaultDecoder.decode(&AudioResource::pcm("bad", vec![0.0], 0, 1));
        assert!(matches!(result, Err(Error::Resource(_))));
    }

    #[test]
    fn cache_shares_one_buffer() {
        let mut cache = BufferCache::new();
        let resource = AudioResource::pcm("waves", vec![0.1; 100], 100, 1);

        let a = cache.get_or_decode(&resource).unwrap();
        let b = cache.get_or_decode(&resource).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        drop(a);
        assert_eq!(cache.evict_unused(), 0);
        drop(b);
        assert_eq!(cache.evict_unused(), 1);
        assert!(cache.is_empty());
    }
}
