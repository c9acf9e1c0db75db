//! Instruction tracks: sorted, non-overlapping instruction sequences.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use framefx_common::clock::TimestampNs;
use serde::{Deserialize, Serialize};

use crate::instruction::CompositionInstruction;
use crate::time::TimeRange;

/// An ordered sequence of instructions with timestamp lookup.
///
/// Invariants: sorted by `time_range.start`, no two ranges intersect, no
/// zero-length ranges. Cloning is cheap; instructions are shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionTrack {
    instructions: Vec<Arc<CompositionInstruction>>,
}

/// On-disk form of a track.
#[derive(Debug, Serialize, Deserialize)]
struct TrackFile {
    instructions: Vec<CompositionInstruction>,
}

impl InstructionTrack {
    /// An empty track; every lookup is passthrough.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a track.
    ///
    /// Input order does not matter. Zero-length instructions cover no
    /// time and are dropped. Any intersecting pair is rejected.
    pub fn new(instructions: Vec<CompositionInstruction>) -> Result<Self, TrackError> {
        let mut instructions: Vec<CompositionInstruction> = instructions
            .into_iter()
            .filter(|inst| {
                let keep = !inst.time_range.is_empty();
                if !keep {
                    tracing::debug!(range = %inst.time_range, "Dropping zero-length instruction");
                }
                keep
            })
            .collect();

        instructions.sort_by_key(|inst| (inst.time_range.start_ns(), inst.time_range.end_ns()));

        for pair in instructions.windows(2) {
            let (a, b) = (&pair[0].time_range, &pair[1].time_range);
            if a.overlaps(b) {
                return Err(TrackError::Overlap {
                    first: *a,
                    second: *b,
                });
            }
        }

        Ok(Self {
            instructions: instructions.into_iter().map(Arc::new).collect(),
        })
    }

    /// The instruction covering `t`, if any. `O(log n)`.
    pub fn lookup(&self, t: TimestampNs) -> Option<&Arc<CompositionInstruction>> {
        self.lookup_index(t).map(|i| &self.instructions[i])
    }

    /// Index of the instruction covering `t`, if any.
    pub fn lookup_index(&self, t: TimestampNs) -> Option<usize> {
        // First instruction starting after t; the candidate is the one before it.
        let after = self
            .instructions
            .partition_point(|inst| inst.time_range.start_ns() <= t);
        let idx = after.checked_sub(1)?;
        self.instructions[idx].time_range.contains(t).then_some(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompositionInstruction>> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// End of the last instruction (0 for an empty track).
    pub fn duration_ns(&self) -> TimestampNs {
        self.instructions
            .last()
            .map_or(0, |inst| inst.time_range.end_ns())
    }

    /// A new track with every instruction intersecting `replacement`'s
    /// range removed and `replacement` inserted. `self` is unchanged.
    pub fn replace(&self, replacement: CompositionInstruction) -> Result<Self, TrackError> {
        let range = replacement.time_range;
        let mut next: Vec<CompositionInstruction> = self
            .instructions
            .iter()
            .filter(|inst| !inst.time_range.overlaps(&range))
            .map(|inst| inst.as_ref().clone())
            .collect();
        next.push(replacement);
        Self::new(next)
    }

    /// Parse a track from JSON (`{"instructions": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, TrackError> {
        let file: TrackFile = serde_json::from_str(json).map_err(TrackError::Parse)?;
        Self::new(file.instructions)
    }

    /// Serialize the track to pretty JSON.
    pub fn to_json(&self) -> Result<String, TrackError> {
        let file = TrackFile {
            instructions: self.iter().map(|inst| inst.as_ref().clone()).collect(),
        };
        serde_json::to_string_pretty(&file).map_err(TrackError::Parse)
    }

    /// Load and validate a track file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TrackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }
}

/// Editor-owned publisher of track snapshots.
///
/// Readers take an `Arc` snapshot and keep it for as long as they need;
/// publishing swaps the whole track, so a reader never sees a partially
/// applied edit.
#[derive(Debug, Default)]
pub struct SharedTrack {
    current: RwLock<Arc<InstructionTrack>>,
}

impl SharedTrack {
    pub fn new(track: InstructionTrack) -> Self {
        Self {
            current: RwLock::new(Arc::new(track)),
        }
    }

    /// The currently published track.
    pub fn snapshot(&self) -> Arc<InstructionTrack> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the published track.
    pub fn publish(&self, track: InstructionTrack) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(track);
    }

    /// Derive a new track from the current one and publish it.
    ///
    /// On error nothing is published.
    pub fn update<F>(&self, edit: F) -> Result<Arc<InstructionTrack>, TrackError>
    where
        F: FnOnce(&InstructionTrack) -> Result<InstructionTrack, TrackError>,
    {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current: &InstructionTrack = &guard;
        let next = Arc::new(edit(current)?);
        *guard = next.clone();
        Ok(next)
    }
}

/// Errors raised while building or loading a track.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Overlapping instructions: {first} and {second}")]
    Overlap { first: TimeRange, second: TimeRange },

    #[error("Invalid track file: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<TrackError> for framefx_common::FramefxError {
    fn from(err: TrackError) -> Self {
        framefx_common::FramefxError::instruction(err.to_string())
    }
}
