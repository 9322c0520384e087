//! Multi-segment session
//!
//! Walks the content's segments in order. Each advance prepares the next
//! segment from scratch, so nothing derived for one segment leaks into the
//! next.

use oldtom_audio::AudioEngine;
use tracing::info;

use crate::content::SegmentDescriptor;
use crate::error::Result;
use crate::timeline::{Synchronizer, TimelineState};

/// Plays a chapter segment by segment
#[derive(Debug)]
pub struct NarrationSession {
    synchronizer: Synchronizer,
    index: Option<usize>,
    finished: bool,
}

impl NarrationSession {
    pub fn new(synchronizer: Synchronizer) -> Self {
        Self {
            synchronizer,
            index: None,
            finished: false,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn synchronizer_mut(&mut self) -> &mut Synchronizer {
        &mut self.synchronizer
    }

    /// Index of the segment currently loaded
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&SegmentDescriptor> {
        self.index
            .and_then(|i| self.synchronizer.content().get(i))
    }

    /// Every segment has completed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The loaded segment has played through
    pub fn segment_complete(&self) -> bool {
        self.synchronizer.state() == TimelineState::Complete
    }

    /// Prepare and play the first segment
    pub async fn start(&mut self, engine: &mut AudioEngine) -> Result<()> {
        self.finished = false;
        self.play_index(engine, 0).await
    }

    /// Move to the next segment; returns `false` once the content is exhausted
    pub async fn advance(&mut self, engine: &mut AudioEngine) -> Result<bool> {
        let next = self.index.map_or(0, |i| i + 1);
        if next >= self.synchronizer.content().len() {
            if !self.finished {
                info!("Session finished");
            }
            self.synchronizer.stop(engine)?;
            self.finished = true;
            return Ok(false);
        }
        self.play_index(engine, next).await?;
        Ok(true)
    }

    /// Jump straight to a segment by id
    pub async fn jump_to(&mut self, engine: &mut AudioEngine, id: &str) -> Result<()> {
        let content = self.synchronizer.content().clone();
        content.segment(id)?;
        let index = content.position(id).unwrap_or(0);
        self.finished = false;
        self.play_index(engine, index).await
    }

    pub fn tick(&mut self, engine: &mut AudioEngine, delta_time: f32) -> Result<()> {
        self.synchronizer.tick(engine, delta_time)
    }

    async fn play_index(&mut self, engine: &mut AudioEngine, index: usize) -> Result<()> {
        let content = self.synchronizer.content().clone();
        let Some(descriptor) = content.get(index) else {
            return Ok(());
        };
        let segment = self.synchronizer.prepare_segment(&descriptor.id).await?;
        self.synchronizer.play(engine, Some(segment))?;
        self.index = Some(index);
        info!("Segment {}/{}: {}", index + 1, content.len(), descriptor.id);
        Ok(())
    }
}
