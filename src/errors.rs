use serde::Serialize;
use thiserror::Error;

use crate::types::{GroupId, StageId};

/// Fatal configuration problems. Generation stops and nothing is returned as
/// schedulable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Tournament has no stages.")]
    NoStages,
    #[error("Tournament has no active pitches.")]
    NoActivePitches,
    #[error("Tournament has no start time.")]
    MissingStartTime,
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),
    #[error("Stage order {order} is used by more than one stage.")]
    DuplicateStageOrder { order: u32 },
    #[error("Stage {stage_id} takes qualifiers from stage {from_stage}, which is not an earlier stage.")]
    InvalidPrerequisite { stage_id: StageId, from_stage: StageId },
    #[error("Stage {stage_id} asks for {per_group} qualifier(s) per group, which its source stage cannot provide.")]
    InvalidQualifierCount { stage_id: StageId, per_group: u32 },
    #[error("Stage {stage_id} takes qualifiers but its format cannot seat placeholder entrants.")]
    QualifiersNotSupported { stage_id: StageId },
    #[error("Group {group_id} in stage {stage_id} has {size} teams; this format needs groups of {expected}.")]
    UnsupportedGroupSize {
        stage_id: StageId,
        group_id: GroupId,
        size: usize,
        expected: usize,
    },
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
