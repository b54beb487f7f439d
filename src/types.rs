use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bracket::{BracketPosition, MatchCondition, MatchRef, Participant};

// ── Constants ──────────────────────────────────────────────────────────

pub const DEFAULT_MIN_REST_MINUTES: i64 = 15;
pub const DEFAULT_PREFERRED_REST_MINUTES: i64 = 30;
pub const DEFAULT_LOOK_AHEAD_MINUTES: i64 = 120;
pub const GROUPED_HYBRID_GROUP_SIZE: usize = 4;

// ── Identifiers ────────────────────────────────────────────────────────

pub type TournamentId = u32;
pub type StageId = u32;
pub type GroupId = u32;
pub type TeamId = u32;
pub type PitchId = u32;

// ── Configuration snapshot ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageFormat {
    RoundRobin,
    GroupStage,
    Knockout,
    DoubleElimination,
    GroupedHybrid,
    Final,
}

impl StageFormat {
    pub fn is_elimination(&self) -> bool {
        matches!(
            self,
            StageFormat::Knockout | StageFormat::DoubleElimination | StageFormat::Final
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundRobinKind {
    #[default]
    Single,
    Double,
}

/// A confirmed registration. List order inside a group is registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAssignment {
    pub team_id: TeamId,
    pub name: String,
    #[serde(default)]
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    pub id: GroupId,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub round_robin: RoundRobinKind,
    #[serde(default)]
    pub teams: Vec<TeamAssignment>,
}

/// Fills an elimination stage with the top `per_group` finishers of every
/// group of an earlier stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifierRule {
    pub from_stage: StageId,
    pub per_group: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub id: StageId,
    pub name: String,
    pub order: u32,
    pub format: StageFormat,
    #[serde(default)]
    pub gap_before_minutes: i64,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub third_place_match: bool,
    #[serde(default = "default_true")]
    pub grand_final_reset: bool,
    #[serde(default)]
    pub qualifiers: Option<QualifierRule>,
}

impl StageConfig {
    pub fn sorted_groups(&self) -> Vec<&GroupConfig> {
        let mut groups = self.groups.iter().collect::<Vec<_>>();
        groups.sort_by_key(|g| (g.order, g.id));
        groups
    }

    pub fn group(&self, group_id: GroupId) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.id == group_id)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pitch {
    pub id: PitchId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    pub start: Option<DateTime<Utc>>,
    pub match_duration_minutes: i64,
    #[serde(default)]
    pub transition_minutes: i64,
    #[serde(default)]
    pub pitches: Vec<Pitch>,
    /// Latest instant a match may end; matches placed past it are reported.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConstraint {
    pub minimum_minutes: i64,
    pub preferred_minutes: i64,
}

impl Default for RestConstraint {
    fn default() -> Self {
        RestConstraint {
            minimum_minutes: DEFAULT_MIN_REST_MINUTES,
            preferred_minutes: DEFAULT_PREFERRED_REST_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentConfig {
    pub id: TournamentId,
    pub name: String,
    pub timing: TimingConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub rest: Option<RestConstraint>,
}

impl TournamentConfig {
    pub fn stage(&self, stage_id: StageId) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.id == stage_id)
    }
}

// ── Results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub home_score: u32,
    pub away_score: u32,
    #[serde(default)]
    pub home_penalties: Option<u32>,
    #[serde(default)]
    pub away_penalties: Option<u32>,
}

impl MatchResult {
    pub fn new(home_score: u32, away_score: u32) -> Self {
        MatchResult {
            home_score,
            away_score,
            home_penalties: None,
            away_penalties: None,
        }
    }

    pub fn with_penalties(mut self, home: u32, away: u32) -> Self {
        self.home_penalties = Some(home);
        self.away_penalties = Some(away);
        self
    }

    pub fn decided_by_penalties(&self) -> bool {
        self.home_score == self.away_score
            && self.home_penalties.is_some()
            && self.away_penalties.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMatch {
    pub stage_id: StageId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub home: TeamId,
    pub away: TeamId,
    pub result: MatchResult,
    #[serde(default)]
    pub elimination: bool,
}

// ── Generated matches ──────────────────────────────────────────────────

/// A pairing without time or pitch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractMatch {
    pub stage_id: StageId,
    pub group_id: Option<GroupId>,
    pub round: u32,
    pub position: Option<BracketPosition>,
    pub home: Participant,
    pub away: Participant,
    pub condition: Option<MatchCondition>,
    pub sequence: u32,
}

impl AbstractMatch {
    pub fn match_ref(&self) -> Option<MatchRef> {
        self.position.map(|position| MatchRef {
            stage_id: self.stage_id,
            group_id: self.group_id,
            position,
        })
    }

    pub fn describe(&self) -> String {
        describe_match(
            self.stage_id,
            self.group_id,
            self.round,
            self.position,
            &self.home,
            &self.away,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bye {
    pub stage_id: StageId,
    pub group_id: Option<GroupId>,
    pub position: BracketPosition,
    pub participant: Participant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub pitch_id: PitchId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub match_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum Allocation {
    Scheduled(TimeSlot),
    NotMaterialized(MatchCondition),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedMatch {
    pub stage_id: StageId,
    pub group_id: Option<GroupId>,
    pub round: u32,
    pub bracket_position: Option<BracketPosition>,
    pub home: Participant,
    pub away: Participant,
    pub allocation: Allocation,
    pub sequence: u32,
    pub metadata: BTreeMap<String, String>,
}

impl AllocatedMatch {
    pub fn slot(&self) -> Option<&TimeSlot> {
        match &self.allocation {
            Allocation::Scheduled(slot) => Some(slot),
            Allocation::NotMaterialized(_) => None,
        }
    }

    pub fn match_ref(&self) -> Option<MatchRef> {
        self.bracket_position.map(|position| MatchRef {
            stage_id: self.stage_id,
            group_id: self.group_id,
            position,
        })
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        [self.home.team_id(), self.away.team_id()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn to_abstract(&self) -> AbstractMatch {
        let condition = match &self.allocation {
            Allocation::NotMaterialized(condition) => Some(*condition),
            Allocation::Scheduled(_) => None,
        };
        AbstractMatch {
            stage_id: self.stage_id,
            group_id: self.group_id,
            round: self.round,
            position: self.bracket_position,
            home: self.home.clone(),
            away: self.away.clone(),
            condition,
            sequence: self.sequence,
        }
    }

    pub fn describe(&self) -> String {
        describe_match(
            self.stage_id,
            self.group_id,
            self.round,
            self.bracket_position,
            &self.home,
            &self.away,
        )
    }
}

fn describe_match(
    stage_id: StageId,
    group_id: Option<GroupId>,
    round: u32,
    position: Option<BracketPosition>,
    home: &Participant,
    away: &Participant,
) -> String {
    let side = |p: &Participant| match p {
        Participant::Known(id) => format!("team {id}"),
        Participant::Pending(slot) => slot.label.clone(),
    };
    let place = match (group_id, position) {
        (Some(g), Some(pos)) => format!("stage {stage_id} group {g} {pos}"),
        (None, Some(pos)) => format!("stage {stage_id} {pos}"),
        (Some(g), None) => format!("stage {stage_id} group {g} round {round}"),
        (None, None) => format!("stage {stage_id} round {round}"),
    };
    format!("{place} ({} v {})", side(home), side(away))
}

// ── Plan issues ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    InsufficientTeams,
    UnsupportedGroupSize,
    MinimumRestUnmet,
    SlotBeyondHorizon,
    PreferredRestUnmet,
    UnevenPitchLoad,
}

impl IssueKind {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            IssueKind::InsufficientTeams
                | IssueKind::UnsupportedGroupSize
                | IssueKind::MinimumRestUnmet
                | IssueKind::SlotBeyondHorizon
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIssue {
    pub kind: IssueKind,
    pub message: String,
    pub stage_id: Option<StageId>,
    pub group_id: Option<GroupId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_match: Option<String>,
}

impl PlanIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        PlanIssue {
            kind,
            message: message.into(),
            stage_id: None,
            group_id: None,
            match_label: None,
            team_id: None,
            conflicting_match: None,
        }
    }

    pub fn in_stage(mut self, stage_id: StageId, group_id: Option<GroupId>) -> Self {
        self.stage_id = Some(stage_id);
        self.group_id = group_id;
        self
    }

    pub fn for_match(mut self, label: String) -> Self {
        self.match_label = Some(label);
        self
    }

    pub fn for_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn conflicting_with(mut self, label: String) -> Self {
        self.conflicting_match = Some(label);
        self
    }
}

// ── Plan ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    pub total_matches: usize,
    pub total_duration_minutes: i64,
    pub pitch_minutes: BTreeMap<PitchId, i64>,
    pub pitch_utilization: BTreeMap<PitchId, f64>,
    pub average_rest_minutes: Option<f64>,
    pub estimated_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlan {
    pub tournament_id: TournamentId,
    pub stage_ids: Vec<StageId>,
    pub matches: Vec<AllocatedMatch>,
    pub byes: Vec<Bye>,
    pub stats: PlanStats,
    pub warnings: Vec<PlanIssue>,
    pub errors: Vec<PlanIssue>,
}

impl SchedulePlan {
    /// A plan carrying hard errors must not be persisted.
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn scheduled(&self) -> impl Iterator<Item = (&AllocatedMatch, &TimeSlot)> {
        self.matches
            .iter()
            .filter_map(|m| m.slot().map(|slot| (m, slot)))
    }

    pub fn find(&self, key: &MatchRef) -> Option<&AllocatedMatch> {
        self.matches
            .iter()
            .find(|m| m.match_ref().as_ref() == Some(key))
    }
}
