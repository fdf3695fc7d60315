use std::num::NonZeroUsize;

use tracing::trace;

use crate::config::DEFAULT_GROUP_SIZE;
use crate::error::MosaicError;
use crate::identity::KnownIdentitySet;
use crate::processor::FrameProcessor;
use crate::region::FaceDecision;
use crate::Frame;

/// Counts from a propagation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Frames that ran full detection and classification.
    pub keyframes: usize,
    /// Frames that reused the previous keyframe's decisions.
    pub reused: usize,
}

impl PropagationStats {
    /// Total frames processed.
    pub fn frames(&self) -> usize {
        self.keyframes + self.reused
    }
}

/// Runs the full pipeline on every `group_size`-th frame and replays the
/// keyframe's decisions on the frames in between.
///
/// Faces move between keyframes; the replayed regions are where they were on
/// the keyframe, not where they are now.
pub struct TemporalPropagator<'a> {
    processor: &'a FrameProcessor,
    group_size: NonZeroUsize,
    index: usize,
    last: Vec<FaceDecision>,
    stats: PropagationStats,
}

impl<'a> TemporalPropagator<'a> {
    /// Propagator with the default group size of 3.
    pub fn new(processor: &'a FrameProcessor) -> Self {
        Self {
            processor,
            group_size: NonZeroUsize::new(DEFAULT_GROUP_SIZE).unwrap_or(NonZeroUsize::MIN),
            index: 0,
            last: Vec::new(),
            stats: PropagationStats::default(),
        }
    }

    /// Set the keyframe spacing.
    pub fn group_size(mut self, group_size: NonZeroUsize) -> Self {
        self.group_size = group_size;
        self
    }

    /// Whether frame `index` runs full detection.
    pub fn is_keyframe(&self, index: usize) -> bool {
        index % self.group_size.get() == 0
    }

    /// Process the next frame of the stream.
    pub fn push(&mut self, mut frame: Frame, known: &KnownIdentitySet) -> Result<Frame, MosaicError> {
        let index = self.index;
        let frame = if self.is_keyframe(index) {
            let result = self.processor.process(frame, Some(known))?;
            self.last = result.decisions;
            self.stats.keyframes += 1;
            trace!(index, faces = self.last.len(), "keyframe");
            result.frame
        } else {
            self.processor.apply_decisions(&mut frame, &self.last)?;
            self.stats.reused += 1;
            frame
        };
        self.index += 1;
        Ok(frame)
    }

    /// Process a whole sequence.
    pub fn process(
        mut self,
        frames: Vec<Frame>,
        known: &KnownIdentitySet,
    ) -> Result<(Vec<Frame>, PropagationStats), MosaicError> {
        let out = frames
            .into_iter()
            .map(|frame| self.push(frame, known))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((out, self.stats))
    }

    /// Decisions carried from the latest keyframe.
    pub fn last_decisions(&self) -> &[FaceDecision] {
        &self.last
    }

    /// Counts so far.
    pub fn stats(&self) -> PropagationStats {
        self.stats
    }
}
