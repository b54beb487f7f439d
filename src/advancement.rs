use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::bracket::{MatchCondition, MatchRef, Participant, SlotRole, SlotSource};
use crate::types::{AbstractMatch, Allocation, GroupId, MatchResult, SchedulePlan, StageId, TeamId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchState {
  /// Waiting on an earlier result or on its condition.
  Pending,
  /// Both sides known; can be played.
  Ready,
  Completed,
  /// A conditional match whose condition resolved the other way.
  Dropped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
  Home,
  Away,
}

/// A placeholder that was replaced by a real team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdate {
  pub target: MatchRef,
  pub side: Side,
  pub team_id: TeamId,
  pub replaced_label: String,
}

#[derive(Clone, Debug)]
struct TrackedSlot {
  source: Participant,
  team_id: Option<TeamId>,
}

#[derive(Clone, Debug)]
struct TrackedMatch {
  key: MatchRef,
  template: AbstractMatch,
  slots: [TrackedSlot; 2],
  condition: Option<MatchCondition>,
  state: MatchState,
  winner: Option<TeamId>,
  loser: Option<TeamId>,
}

impl TrackedMatch {
  fn participants(&self) -> [Participant; 2] {
    [0, 1].map(|i| match self.slots[i].team_id {
      Some(id) => Participant::Known(id),
      None => self.slots[i].source.clone(),
    })
  }

  fn refresh_state(&mut self) {
    if self.state != MatchState::Pending || self.condition.is_some() {
      return;
    }
    if self.slots.iter().all(|slot| slot.team_id.is_some()) {
      self.state = MatchState::Ready;
    }
  }
}

/// Dependency graph between bracket matches. Holds, for every slot whose
/// team is not yet known, the match or group ranking it waits on.
#[derive(Clone, Debug, Default)]
pub struct Advancement {
  matches: Vec<TrackedMatch>,
  index: HashMap<MatchRef, usize>,
  match_waiters: HashMap<MatchRef, Vec<usize>>,
  group_waiters: HashMap<(StageId, GroupId), Vec<usize>>,
}

impl Advancement {
  /// Tracks every bracket match; round-robin fixtures carry no position and
  /// only matter through group rankings.
  pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a AbstractMatch>) -> Self {
    let mut graph = Advancement::default();
    for m in matches {
      let Some(key) = m.match_ref() else {
        continue;
      };
      let slots = [&m.home, &m.away].map(|p| TrackedSlot {
        source: p.clone(),
        team_id: p.team_id(),
      });
      let idx = graph.matches.len();
      for slot in &slots {
        match slot.source.pending().map(|p| &p.source) {
          Some(SlotSource::Match { from, .. }) => {
            graph.match_waiters.entry(*from).or_default().push(idx);
          }
          Some(SlotSource::GroupRank { stage_id, group_id, .. }) => {
            graph.group_waiters.entry((*stage_id, *group_id)).or_default().push(idx);
          }
          None => {}
        }
      }
      let mut tracked = TrackedMatch {
        key,
        template: m.clone(),
        slots,
        condition: m.condition,
        state: MatchState::Pending,
        winner: None,
        loser: None,
      };
      tracked.refresh_state();
      graph.index.insert(key, idx);
      graph.matches.push(tracked);
    }
    graph
  }

  pub fn from_plan(plan: &SchedulePlan) -> Self {
    let templates = plan.matches.iter().map(|m| m.to_abstract()).collect::<Vec<_>>();
    Advancement::from_matches(&templates)
  }

  pub fn state(&self, key: &MatchRef) -> Option<MatchState> {
    self.get(key).map(|m| m.state)
  }

  pub fn participants(&self, key: &MatchRef) -> Option<[Participant; 2]> {
    self.get(key).map(|m| m.participants())
  }

  pub fn winner(&self, key: &MatchRef) -> Option<TeamId> {
    self.get(key).and_then(|m| m.winner)
  }

  /// Matches whose both sides are known and that have not been played,
  /// in scheduling order.
  pub fn eligible(&self) -> Vec<MatchRef> {
    let mut ready = self
      .matches
      .iter()
      .filter(|m| m.state == MatchState::Ready)
      .collect::<Vec<_>>();
    ready.sort_by_key(|m| (m.key.stage_id, m.template.round, m.key.position.sort_key(), m.template.sequence));
    ready.into_iter().map(|m| m.key).collect()
  }

  /// Records a bracket result and pushes the winner and loser into every
  /// slot waiting on them. Level scores need a penalty decision.
  pub fn record_result(&mut self, key: &MatchRef, result: &MatchResult) -> Result<Vec<SlotUpdate>, String> {
    let idx = self
      .index
      .get(key)
      .copied()
      .ok_or_else(|| format!("Match {key} is not part of the bracket."))?;
    let (winner_slot, winner, loser) = {
      let m = &self.matches[idx];
      match m.state {
        MatchState::Ready => {}
        MatchState::Pending => return Err(format!("Match {key} is still waiting for its participants.")),
        MatchState::Completed => return Err(format!("Match {key} already has a result.")),
        MatchState::Dropped => return Err(format!("Match {key} is not being played.")),
      }
      let winner_slot = decide_winner(result).ok_or_else(|| format!("Result for {key} does not decide a winner."))?;
      let loser_slot = 1 - winner_slot;
      (winner_slot, m.slots[winner_slot].team_id, m.slots[loser_slot].team_id)
    };
    let (Some(winner), Some(loser)) = (winner, loser) else {
      return Err(format!("Match {key} is missing a participant."));
    };

    {
      let m = &mut self.matches[idx];
      m.state = MatchState::Completed;
      m.winner = Some(winner);
      m.loser = Some(loser);
    }
    info!(match_ref = %key, winner, loser, "recorded bracket result");

    let mut updates = Vec::new();
    let waiters = self.match_waiters.get(key).cloned().unwrap_or_default();
    for waiter in waiters {
      let target = &mut self.matches[waiter];
      for (side_idx, slot) in target.slots.iter_mut().enumerate() {
        let Some(pending) = slot.source.pending() else {
          continue;
        };
        let SlotSource::Match { from, role } = &pending.source else {
          continue;
        };
        if from != key || slot.team_id.is_some() {
          continue;
        }
        let team_id = match role {
          SlotRole::Winner => winner,
          SlotRole::Loser => loser,
        };
        slot.team_id = Some(team_id);
        updates.push(SlotUpdate {
          target: target.key,
          side: if side_idx == 0 { Side::Home } else { Side::Away },
          team_id,
          replaced_label: pending.label.clone(),
        });
      }
      target.refresh_state();
    }

    self.apply_conditions(key, winner_slot);
    debug!(match_ref = %key, filled = updates.len(), "advanced bracket slots");
    Ok(updates)
  }

  /// Fills slots waiting on a group finishing position. `ranking` is the
  /// final table, first place first.
  pub fn record_group_ranking(&mut self, stage_id: StageId, group_id: GroupId, ranking: &[TeamId]) -> Vec<SlotUpdate> {
    let mut updates = Vec::new();
    let waiters = self.group_waiters.get(&(stage_id, group_id)).cloned().unwrap_or_default();
    for waiter in waiters {
      let target = &mut self.matches[waiter];
      for (side_idx, slot) in target.slots.iter_mut().enumerate() {
        let Some(pending) = slot.source.pending() else {
          continue;
        };
        let SlotSource::GroupRank { stage_id: s, group_id: g, rank } = &pending.source else {
          continue;
        };
        if *s != stage_id || *g != group_id || slot.team_id.is_some() {
          continue;
        }
        let Some(team_id) = (*rank as usize).checked_sub(1).and_then(|i| ranking.get(i)).copied() else {
          continue;
        };
        slot.team_id = Some(team_id);
        updates.push(SlotUpdate {
          target: target.key,
          side: if side_idx == 0 { Side::Home } else { Side::Away },
          team_id,
          replaced_label: pending.label.clone(),
        });
      }
      target.refresh_state();
    }
    info!(stage_id, group_id, filled = updates.len(), "applied group ranking");
    updates
  }

  /// The conditional match behind `key`, once its condition has been met,
  /// with every known team filled in. `None` while undecided or dropped.
  pub fn materialize(&self, key: &MatchRef) -> Option<AbstractMatch> {
    let m = self.get(key)?;
    if m.template.condition.is_none() || m.condition.is_some() || m.state == MatchState::Dropped {
      return None;
    }
    let [home, away] = m.participants();
    Some(AbstractMatch {
      home,
      away,
      condition: None,
      ..m.template.clone()
    })
  }

  /// Writes resolved teams into a plan so a caller can persist them. Matches
  /// dropped by their condition are removed from the plan.
  pub fn apply_to_plan(&self, plan: &mut SchedulePlan) {
    plan.matches.retain(|m| {
      m.match_ref()
        .and_then(|key| self.state(&key))
        .map(|state| state != MatchState::Dropped)
        .unwrap_or(true)
    });
    for m in plan.matches.iter_mut() {
      let Some(key) = m.match_ref() else {
        continue;
      };
      let Some(tracked) = self.get(&key) else {
        continue;
      };
      let [home, away] = tracked.participants();
      if let Participant::Known(id) = home {
        m.home = Participant::Known(id);
        m.metadata.remove("homeSource");
      }
      if let Participant::Known(id) = away {
        m.away = Participant::Known(id);
        m.metadata.remove("awaySource");
      }
      if tracked.condition.is_none() {
        if let Allocation::NotMaterialized(_) = m.allocation {
          m.metadata.insert("condition".to_string(), "met".to_string());
        }
      }
    }
  }

  fn apply_conditions(&mut self, decided: &MatchRef, winner_slot: usize) {
    for m in self.matches.iter_mut() {
      let Some(MatchCondition::GrandFinalReset { grand_final }) = m.condition else {
        continue;
      };
      if grand_final != *decided {
        continue;
      }
      m.condition = None;
      if winner_slot == 1 {
        info!(match_ref = %m.key, "losers-bracket champion won the grand final; reset is on");
        m.refresh_state();
      } else {
        info!(match_ref = %m.key, "winners-bracket champion won the grand final; reset dropped");
        m.state = MatchState::Dropped;
      }
    }
  }

  fn get(&self, key: &MatchRef) -> Option<&TrackedMatch> {
    self.index.get(key).and_then(|idx| self.matches.get(*idx))
  }
}

/// Slot index of the winner: 0 for home, 1 for away.
pub fn decide_winner(result: &MatchResult) -> Option<usize> {
  if result.home_score != result.away_score {
    return Some(if result.home_score > result.away_score { 0 } else { 1 });
  }
  match (result.home_penalties, result.away_penalties) {
    (Some(home), Some(away)) if home != away => Some(if home > away { 0 } else { 1 }),
    _ => None,
  }
}
