//! Narration timeline for Old Tom: The Living Legend
//!
//! This crate turns static story content into synchronized playback:
//! - Content records (segments with scene, tone, soundscape and effect tags)
//! - Voice synthesis and audio storage behind async capability traits
//! - Derivation of a [`SynchronizedSegment`] (tracks, keyframes, sync events)
//! - A [`Synchronizer`] that plays one segment through an `AudioEngine`
//! - A [`NarrationSession`] that walks a chapter segment by segment
//!
//! # Flow
//!
//! ```text
//! NarrativeContent ──► prepare_segment ──► SynchronizedSegment
//!                        │  resolver: cache → synthesize (timeout) → store
//!                        │  tracks:   TrackSource per soundscape tag
//!                        ▼
//!                      play ──► AudioEngine (narration / ambience / music layers)
//!                        │
//!                      tick ──► TimelineEvent bus
//!                               (keyframes, sync events, time updates, completion)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mut sync = Synchronizer::new(config, content, synth, store, tracks);
//! let mut events = sync.subscribe();
//!
//! let segment = sync.prepare_segment("c1-s1").await?;
//! sync.play(&mut engine, Some(segment))?;
//!
//! loop {
//!     engine.tick(dt)?;
//!     sync.tick(&mut engine, dt)?;
//!     for event in events.drain() {
//!         renderer.apply(&event);
//!     }
//! }
//! ```

pub mod capability;
pub mod content;
pub mod effects;
pub mod error;
pub mod segment;
pub mod session;
pub mod timeline;

pub use capability::{
    estimate_duration, AudioStore, MemoryAudioStore, NarrationResolver, OfflineSynthesizer,
    ResolvedNarration, ToneTrackSource, TrackSource, VoiceProfile, VoiceSynthesizer,
};
pub use content::{NarrativeContent, SegmentDescriptor};
pub use effects::{CameraPose, EffectParams, EffectTag, SceneTag, SoundscapeTag, TrackDescriptor};
pub use error::{Error, Result};
pub use segment::{
    AudioTrack, NarrationTrack, SyncAction, SyncEvent, SyncEventKind, SynchronizedSegment,
    VisualKeyframe,
};
pub use session::NarrationSession;
pub use timeline::{Synchronizer, TimelineConfig, TimelineEvent, TimelineState};
