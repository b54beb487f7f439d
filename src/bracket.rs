use serde::{Serialize, Serializer};
use std::fmt;

use crate::types::{GroupId, StageId, TeamId};

/// Structural role of a match inside an elimination bracket.
///
/// Display strings (`W-2-1`, `L-3-1`, `GF`, `GF-R`, `3P`) are derived from the
/// variant and are only ever produced, never parsed back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BracketPosition {
  Winners { round: u32, index: u32 },
  Losers { round: u32, index: u32 },
  GrandFinal,
  GrandFinalReset,
  ThirdPlace,
}

impl BracketPosition {
  /// Ordering used as a tie-break when two matches share a scheduling round.
  pub fn sort_key(&self) -> (u8, u32, u32) {
    match *self {
      BracketPosition::Winners { round, index } => (0, round, index),
      BracketPosition::Losers { round, index } => (1, round, index),
      BracketPosition::ThirdPlace => (2, 0, 0),
      BracketPosition::GrandFinal => (3, 0, 0),
      BracketPosition::GrandFinalReset => (4, 0, 0),
    }
  }
}

impl fmt::Display for BracketPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      BracketPosition::Winners { round, index } => write!(f, "W-{round}-{index}"),
      BracketPosition::Losers { round, index } => write!(f, "L-{round}-{index}"),
      BracketPosition::GrandFinal => f.write_str("GF"),
      BracketPosition::GrandFinalReset => f.write_str("GF-R"),
      BracketPosition::ThirdPlace => f.write_str("3P"),
    }
  }
}

impl Serialize for BracketPosition {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// Stable address of a bracket match. Grouped hybrid stages reuse the same
/// positions in every group, so the group is part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRef {
  pub stage_id: StageId,
  pub group_id: Option<GroupId>,
  pub position: BracketPosition,
}

impl fmt::Display for MatchRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.group_id {
      Some(group_id) => write!(f, "stage {} group {} {}", self.stage_id, group_id, self.position),
      None => write!(f, "stage {} {}", self.stage_id, self.position),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotRole {
  Winner,
  Loser,
}

/// Where a not-yet-known participant will come from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotSource {
  #[serde(rename_all = "camelCase")]
  Match { from: MatchRef, role: SlotRole },
  #[serde(rename_all = "camelCase")]
  GroupRank {
    stage_id: StageId,
    group_id: GroupId,
    rank: u32,
  },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSlot {
  pub source: SlotSource,
  pub label: String,
}

/// A match side: either a confirmed team or a description of where the team
/// will come from once earlier results are in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Participant {
  Known(TeamId),
  Pending(PendingSlot),
}

impl Participant {
  pub fn team_id(&self) -> Option<TeamId> {
    match self {
      Participant::Known(id) => Some(*id),
      Participant::Pending(_) => None,
    }
  }

  pub fn pending(&self) -> Option<&PendingSlot> {
    match self {
      Participant::Known(_) => None,
      Participant::Pending(slot) => Some(slot),
    }
  }

  pub fn source_label(&self) -> Option<&str> {
    self.pending().map(|slot| slot.label.as_str())
  }

  pub fn from_match(from: MatchRef, role: SlotRole, group_name: Option<&str>) -> Self {
    let verb = match role {
      SlotRole::Winner => "Winner",
      SlotRole::Loser => "Loser",
    };
    let label = match group_name {
      Some(name) => format!("{verb} of {name} {}", from.position),
      None => format!("{verb} of {}", from.position),
    };
    Participant::Pending(PendingSlot {
      source: SlotSource::Match { from, role },
      label,
    })
  }
}

/// Condition gating a match that only exists if an earlier result calls for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MatchCondition {
  /// Played only if the away side of the grand final (the losers-bracket
  /// champion) wins it.
  #[serde(rename_all = "camelCase")]
  GrandFinalReset { grand_final: MatchRef },
}

pub fn rank_label(group_name: &str, rank: u32) -> String {
  match rank {
    1 => format!("Winner of {group_name}"),
    2 => format!("Runner-up of {group_name}"),
    _ => format!("{} of {group_name}", ordinal(rank)),
  }
}

fn ordinal(n: u32) -> String {
  let suffix = match (n % 10, n % 100) {
    (_, 11..=13) => "th",
    (1, _) => "st",
    (2, _) => "nd",
    (3, _) => "rd",
    _ => "th",
  };
  format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn positions_render_fixed_vocabulary() {
    assert_eq!(BracketPosition::Winners { round: 1, index: 2 }.to_string(), "W-1-2");
    assert_eq!(BracketPosition::Losers { round: 3, index: 1 }.to_string(), "L-3-1");
    assert_eq!(BracketPosition::GrandFinal.to_string(), "GF");
    assert_eq!(BracketPosition::GrandFinalReset.to_string(), "GF-R");
    assert_eq!(BracketPosition::ThirdPlace.to_string(), "3P");
  }

  #[test]
  fn positions_serialize_as_labels() {
    let json = serde_json::to_string(&BracketPosition::Losers { round: 2, index: 4 }).unwrap();
    assert_eq!(json, "\"L-2-4\"");
  }

  #[test]
  fn match_sources_carry_readable_labels() {
    let from = MatchRef {
      stage_id: 3,
      group_id: None,
      position: BracketPosition::Winners { round: 1, index: 2 },
    };
    let loser = Participant::from_match(from, SlotRole::Loser, None);
    assert_eq!(loser.source_label(), Some("Loser of W-1-2"));
    assert_eq!(loser.team_id(), None);
    assert_eq!(Participant::Known(7).team_id(), Some(7));
  }

  #[test]
  fn rank_labels_use_ordinals() {
    assert_eq!(rank_label("Group A", 1), "Winner of Group A");
    assert_eq!(rank_label("Group A", 2), "Runner-up of Group A");
    assert_eq!(rank_label("Group B", 3), "3rd of Group B");
    assert_eq!(rank_label("Group B", 11), "11th of Group B");
  }
}
