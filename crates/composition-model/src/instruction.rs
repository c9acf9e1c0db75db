//! Composition instructions: one filter assignment over one time range.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::params::{ParamMap, ParamValue};
use crate::time::TimeRange;

/// Identifier of a source video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Declarative description of which filter applies over a time range.
///
/// Immutable once built: the builder methods consume `self`. Tracks hold
/// instructions behind `Arc`, so "editing" one means publishing a new
/// track containing a replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionInstruction {
    /// Half-open range this instruction covers.
    pub time_range: TimeRange,

    /// Source track whose frame this instruction consumes.
    pub source_track_id: TrackId,

    /// Filter catalog id. `None` means passthrough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<String>,

    /// Overrides applied on top of the catalog defaults.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub parameters: ParamMap,
}

impl CompositionInstruction {
    /// A passthrough instruction for `track` over `time_range`.
    pub fn new(time_range: TimeRange, source_track_id: TrackId) -> Self {
        Self {
            time_range,
            source_track_id,
            filter_id: None,
            parameters: ParamMap::new(),
        }
    }

    pub fn with_filter(mut self, filter_id: impl Into<String>) -> Self {
        self.filter_id = Some(filter_id.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// No filter, or a blank filter id.
    pub fn is_passthrough(&self) -> bool {
        self.filter_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
    }

    /// The filter id, if this instruction applies one.
    pub fn filter(&self) -> Option<&str> {
        if self.is_passthrough() {
            None
        } else {
            self.filter_id.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(a: u64, b: u64) -> TimeRange {
        TimeRange::new(a, b).unwrap()
    }

    #[test]
    fn test_passthrough_detection() {
        let plain = CompositionInstruction::new(range(0, 10), TrackId(1));
        assert!(plain.is_passthrough());
        assert!(plain.filter().is_none());

        let blank = plain.clone().with_filter("  ");
        assert!(blank.is_passthrough());

        let sepia = plain.with_filter("sepia");
        assert!(!sepia.is_passthrough());
        assert_eq!(sepia.filter(), Some("sepia"));
    }

    #[test]
    fn test_builder_params() {
        let inst = CompositionInstruction::new(range(0, 10), TrackId(2))
            .with_filter("sepia")
            .with_param("intensity", 0.8)
            .with_param("intensity", 0.6);
        assert_eq!(inst.parameters.len(), 1);
        assert_eq!(inst.parameters["intensity"].as_number(), Some(0.6));
    }

    #[test]
    fn test_json_roundtrip_omits_empty_fields() {
        let inst = CompositionInstruction::new(range(0, 5), TrackId(7));
        let json = serde_json::to_string(&inst).unwrap();
        assert!(!json.contains("filter_id"));
        assert!(!json.contains("parameters"));

        let back: CompositionInstruction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inst);
    }

    #[test]
    fn test_track_id_display() {
        assert_eq!(TrackId(3).to_string(), "track#3");
    }
}
