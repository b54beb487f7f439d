use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::bracket::{MatchRef, SlotSource};
use crate::errors::ConfigError;
use crate::types::{
  AbstractMatch, AllocatedMatch, Allocation, GroupId, IssueKind, Pitch, PitchId, PlanIssue, PlanStats, RestConstraint,
  SchedulePlan, StageConfig, StageId, TeamId, TimeSlot, TimingConfig,
};

#[derive(Clone, Debug)]
struct Lane {
  pitch_id: PitchId,
  /// Occupied `[start, end)` windows in minutes from the tournament start,
  /// sorted by start.
  busy: Vec<(i64, i64)>,
}

impl Lane {
  fn earliest_start(&self, from: i64, duration: i64, transition: i64) -> i64 {
    let mut candidate = from;
    for &(start, end) in &self.busy {
      if candidate + duration + transition <= start {
        return candidate;
      }
      candidate = candidate.max(end + transition);
    }
    candidate
  }

  fn free_at(&self) -> i64 {
    self.busy.last().map(|&(_, end)| end).unwrap_or(0)
  }

  fn reserve(&mut self, start: i64, end: i64) {
    let idx = self.busy.partition_point(|&(s, _)| s < start);
    self.busy.insert(idx, (start, end));
  }
}

#[derive(Clone, Debug)]
struct Visit {
  end: i64,
  label: String,
}

/// Everything allocation decisions depend on: per-pitch occupancy, the last
/// match of every team, and when each placed match, group and stage ends.
/// Threaded through the allocation loop as a single-writer value.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
  lanes: Vec<Lane>,
  visits: HashMap<TeamId, Visit>,
  match_ends: HashMap<MatchRef, i64>,
  group_ends: HashMap<(StageId, GroupId), i64>,
  stage_ends: HashMap<StageId, i64>,
}

impl Timeline {
  pub fn new(pitches: &[Pitch]) -> Self {
    Timeline {
      lanes: pitches
        .iter()
        .map(|p| Lane {
          pitch_id: p.id,
          busy: Vec::new(),
        })
        .collect(),
      ..Timeline::default()
    }
  }

  /// Rebuilds the timeline of an already allocated plan.
  pub fn from_plan(pitches: &[Pitch], start: DateTime<Utc>, matches: &[AllocatedMatch]) -> Self {
    let mut timeline = Timeline::new(pitches);
    let mut scheduled = matches
      .iter()
      .filter_map(|m| m.slot().map(|slot| (m, slot)))
      .collect::<Vec<_>>();
    scheduled.sort_by_key(|(_, slot)| slot.start);
    for (m, slot) in scheduled {
      let lane = timeline.lanes.iter().position(|l| l.pitch_id == slot.pitch_id);
      let from = (slot.start - start).num_minutes();
      let to = (slot.end - start).num_minutes();
      timeline.occupy(
        lane,
        from,
        to,
        m.match_ref(),
        m.stage_id,
        m.group_id,
        &m.team_ids(),
        &m.describe(),
      );
    }
    timeline
  }

  /// Minute offsets of every reservation on a pitch.
  pub fn busy(&self, pitch_id: PitchId) -> Option<&[(i64, i64)]> {
    self
      .lanes
      .iter()
      .find(|l| l.pitch_id == pitch_id)
      .map(|l| l.busy.as_slice())
  }

  pub fn last_end(&self, team_id: TeamId) -> Option<i64> {
    self.visits.get(&team_id).map(|v| v.end)
  }

  /// Best (lane, start) at or after `from`: earliest start, then the pitch
  /// that frees up first, then pitch order.
  fn best_slot(&self, from: i64, duration: i64, transition: i64) -> Option<(usize, i64)> {
    self
      .lanes
      .iter()
      .enumerate()
      .map(|(idx, lane)| (lane.earliest_start(from, duration, transition), lane.free_at(), idx))
      .min()
      .map(|(start, _, idx)| (idx, start))
  }

  /// Earliest start allowed by the matches and groups this one is fed from.
  fn dependency_ready(&self, m: &AbstractMatch, min_rest: i64) -> i64 {
    [&m.home, &m.away]
      .into_iter()
      .filter_map(|p| p.pending())
      .filter_map(|slot| match &slot.source {
        SlotSource::Match { from, .. } => self.match_ends.get(from),
        SlotSource::GroupRank { stage_id, group_id, .. } => self.group_ends.get(&(*stage_id, *group_id)),
      })
      .map(|end| end + min_rest)
      .max()
      .unwrap_or(0)
  }

  #[allow(clippy::too_many_arguments)]
  fn occupy(
    &mut self,
    lane: Option<usize>,
    start: i64,
    end: i64,
    key: Option<MatchRef>,
    stage_id: StageId,
    group_id: Option<GroupId>,
    teams: &[TeamId],
    label: &str,
  ) {
    if let Some(lane) = lane.and_then(|idx| self.lanes.get_mut(idx)) {
      lane.reserve(start, end);
    }
    for team in teams {
      let visit = self.visits.entry(*team).or_insert_with(|| Visit {
        end,
        label: label.to_string(),
      });
      if end >= visit.end {
        visit.end = end;
        visit.label = label.to_string();
      }
    }
    if let Some(key) = key {
      self.match_ends.insert(key, end);
    }
    if let Some(group_id) = group_id {
      let group_end = self.group_ends.entry((stage_id, group_id)).or_insert(end);
      *group_end = (*group_end).max(end);
    }
    let stage_end = self.stage_ends.entry(stage_id).or_insert(end);
    *stage_end = (*stage_end).max(end);
  }
}

#[derive(Clone, Debug, Default)]
pub struct AllocationOutcome {
  pub matches: Vec<AllocatedMatch>,
  pub stats: PlanStats,
  pub warnings: Vec<PlanIssue>,
  pub errors: Vec<PlanIssue>,
}

struct Placement {
  lane: usize,
  start: i64,
  end: i64,
}

/// Assigns pitches and time windows to generated matches.
#[derive(Clone, Debug)]
pub struct Allocator {
  pitches: Vec<Pitch>,
  start: DateTime<Utc>,
  duration: i64,
  transition: i64,
  horizon: Option<i64>,
  rest: RestConstraint,
  look_ahead: i64,
  stage_order: HashMap<StageId, (u32, i64)>,
  group_order: HashMap<(StageId, GroupId), u32>,
}

impl Allocator {
  pub fn new(timing: &TimingConfig, rest: RestConstraint, look_ahead_minutes: i64) -> Result<Self, ConfigError> {
    let start = timing.start.ok_or(ConfigError::MissingStartTime)?;
    if timing.pitches.is_empty() {
      return Err(ConfigError::NoActivePitches);
    }
    if timing.match_duration_minutes <= 0 {
      return Err(ConfigError::InvalidTiming(format!(
        "match duration must be positive, got {} minutes",
        timing.match_duration_minutes
      )));
    }
    if timing.transition_minutes < 0 {
      return Err(ConfigError::InvalidTiming(format!(
        "transition time cannot be negative, got {} minutes",
        timing.transition_minutes
      )));
    }
    if rest.minimum_minutes < 0 || rest.preferred_minutes < rest.minimum_minutes {
      return Err(ConfigError::InvalidTiming(format!(
        "rest of {}/{} minutes is not a valid minimum/preferred pair",
        rest.minimum_minutes, rest.preferred_minutes
      )));
    }
    if look_ahead_minutes < 0 {
      return Err(ConfigError::InvalidTiming("look-ahead window cannot be negative".to_string()));
    }
    let horizon = match timing.end {
      Some(end) if end <= start => {
        return Err(ConfigError::InvalidTiming("end time must be after the start time".to_string()));
      }
      Some(end) => Some((end - start).num_minutes()),
      None => None,
    };
    Ok(Allocator {
      pitches: timing.pitches.clone(),
      start,
      duration: timing.match_duration_minutes,
      transition: timing.transition_minutes,
      horizon,
      rest,
      look_ahead: look_ahead_minutes,
      stage_order: HashMap::new(),
      group_order: HashMap::new(),
    })
  }

  /// Stage order, gaps and group order used to sequence matches.
  pub fn with_stages(mut self, stages: &[StageConfig]) -> Self {
    for stage in stages {
      self.stage_order.insert(stage.id, (stage.order, stage.gap_before_minutes));
      for group in &stage.groups {
        self.group_order.insert((stage.id, group.id), group.order);
      }
    }
    self
  }

  pub fn allocate(&self, matches: &[AbstractMatch]) -> AllocationOutcome {
    let mut ordered = matches.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|m| self.order_key(m));

    let mut timeline = Timeline::new(&self.pitches);
    let mut issues = Vec::new();
    let mut stage_bases: HashMap<StageId, i64> = HashMap::new();
    let mut placed: Vec<(&AbstractMatch, Placement)> = Vec::with_capacity(ordered.len());
    let mut conditional = Vec::new();

    for m in ordered {
      if m.condition.is_some() {
        conditional.push(m);
        continue;
      }
      let base = match stage_bases.get(&m.stage_id) {
        Some(base) => *base,
        None => {
          let gap = self.stage_order.get(&m.stage_id).map(|&(_, gap)| gap).unwrap_or(0);
          let base = if gap > 0 {
            timeline.stage_ends.values().max().map(|end| end + gap).unwrap_or(0)
          } else {
            0
          };
          if base > 0 {
            debug!(stage_id = m.stage_id, base, "stage held back by its gap");
          }
          stage_bases.insert(m.stage_id, base);
          base
        }
      };
      if let Some(placement) = self.place(&mut timeline, m, base, &mut issues) {
        placed.push((m, placement));
      }
    }

    let pitch_rank = self.pitch_rank();
    placed.sort_by_key(|(_, p)| (p.start, pitch_rank.get(&self.pitches[p.lane].id).copied().unwrap_or(usize::MAX)));

    let mut allocated = Vec::with_capacity(placed.len() + conditional.len());
    for (idx, (m, p)) in placed.iter().enumerate() {
      let slot = TimeSlot {
        pitch_id: self.pitches[p.lane].id,
        start: self.at(p.start),
        end: self.at(p.end),
        match_number: idx as u32 + 1,
      };
      allocated.push(allocated_match(m, Allocation::Scheduled(slot)));
    }
    for m in conditional {
      if let Some(condition) = m.condition {
        allocated.push(allocated_match(m, Allocation::NotMaterialized(condition)));
      }
    }

    if let Some(issue) = pitch_load_warning(&allocated, &self.pitches) {
      issues.push(issue);
    }
    let stats = plan_stats(&allocated, &self.pitches);
    let (errors, warnings): (Vec<_>, Vec<_>) = issues.into_iter().partition(|i| i.kind.is_error());
    info!(
      matches = stats.total_matches,
      minutes = stats.total_duration_minutes,
      errors = errors.len(),
      warnings = warnings.len(),
      "allocated matches"
    );
    AllocationOutcome {
      matches: allocated,
      stats,
      warnings,
      errors,
    }
  }

  /// Places a conditional match that has become playable onto the timeline of
  /// an existing plan, replacing its unmaterialized entry.
  pub fn allocate_materialized(&self, plan: &mut SchedulePlan, materialized: &AbstractMatch) -> Result<(), String> {
    let key = materialized
      .match_ref()
      .ok_or_else(|| "Only bracket matches can be materialized.".to_string())?;
    let idx = plan
      .matches
      .iter()
      .position(|m| m.match_ref() == Some(key) && m.slot().is_none())
      .ok_or_else(|| format!("Plan has no unscheduled match at {key}."))?;

    let mut timeline = Timeline::from_plan(&self.pitches, self.start, &plan.matches);
    let mut issues = Vec::new();
    let placement = self
      .place(&mut timeline, materialized, 0, &mut issues)
      .ok_or_else(|| "No pitch is available.".to_string())?;
    let slot = TimeSlot {
      pitch_id: self.pitches[placement.lane].id,
      start: self.at(placement.start),
      end: self.at(placement.end),
      match_number: 0,
    };
    info!(match_ref = %key, pitch = slot.pitch_id, start = %slot.start, "materialized conditional match");
    plan.matches[idx] = allocated_match(materialized, Allocation::Scheduled(slot));
    for issue in issues {
      if issue.kind.is_error() {
        plan.errors.push(issue);
      } else {
        plan.warnings.push(issue);
      }
    }
    self.renumber(&mut plan.matches);
    plan.warnings.retain(|w| w.kind != IssueKind::UnevenPitchLoad);
    if let Some(issue) = pitch_load_warning(&plan.matches, &self.pitches) {
      plan.warnings.push(issue);
    }
    plan.stats = plan_stats(&plan.matches, &self.pitches);
    Ok(())
  }

  /// Numbers scheduled matches 1..N by (start, pitch order) and keeps the
  /// list in that order, unmaterialized matches last.
  fn renumber(&self, matches: &mut [AllocatedMatch]) {
    let pitch_rank = self.pitch_rank();
    let sort_key = |m: &AllocatedMatch| {
      m.slot()
        .map(|s| (0, s.start, pitch_rank.get(&s.pitch_id).copied().unwrap_or(usize::MAX)))
        .unwrap_or((1, self.start, usize::MAX))
    };
    matches.sort_by_key(sort_key);
    for (idx, m) in matches.iter_mut().enumerate() {
      if let Allocation::Scheduled(slot) = &mut m.allocation {
        slot.match_number = idx as u32 + 1;
      }
    }
  }

  fn order_key(&self, m: &AbstractMatch) -> (u32, StageId, u32, u32, (u8, u32, u32), u32) {
    let stage_order = self.stage_order.get(&m.stage_id).map(|&(order, _)| order).unwrap_or(u32::MAX);
    let group_order = m
      .group_id
      .and_then(|g| self.group_order.get(&(m.stage_id, g)).copied())
      .unwrap_or(0);
    let position = m.position.map(|p| p.sort_key()).unwrap_or((0, 0, 0));
    (stage_order, m.stage_id, m.round, group_order, position, m.sequence)
  }

  fn place(
    &self,
    timeline: &mut Timeline,
    m: &AbstractMatch,
    base: i64,
    issues: &mut Vec<PlanIssue>,
  ) -> Option<Placement> {
    let min_rest = self.rest.minimum_minutes;
    let label = m.describe();
    let ready = base.max(timeline.dependency_ready(m, min_rest));
    let mut teams = [m.home.team_id(), m.away.team_id()]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>();
    teams.dedup();
    let last_end = teams
      .iter()
      .filter_map(|t| timeline.visits.get(t))
      .map(|v| v.end)
      .max();

    // Without rest the match could go right after the teams' previous one;
    // the look-ahead window is measured from there.
    let natural = last_end.map_or(ready, |end| ready.max(end));
    let (mut lane, mut start) = timeline.best_slot(natural, self.duration, self.transition)?;
    let rested = last_end.map_or(ready, |end| ready.max(end + min_rest));

    if rested > start {
      let (rest_lane, rest_start) = timeline.best_slot(rested, self.duration, self.transition)?;
      if rest_start - start <= self.look_ahead {
        lane = rest_lane;
        start = rest_start;
      } else {
        for team in &teams {
          let Some(visit) = timeline.visits.get(team) else {
            continue;
          };
          if start - visit.end >= min_rest {
            continue;
          }
          warn!(match_label = %label, team, "minimum rest cannot be met within the look-ahead window");
          issues.push(
            PlanIssue::new(
              IssueKind::MinimumRestUnmet,
              format!(
                "Team {team} gets {} minute(s) of rest before {label}; at least {min_rest} are required.",
                start - visit.end
              ),
            )
            .in_stage(m.stage_id, m.group_id)
            .for_match(label.clone())
            .for_team(*team)
            .conflicting_with(visit.label.clone()),
          );
        }
      }
    }

    for team in &teams {
      let Some(visit) = timeline.visits.get(team) else {
        continue;
      };
      let rest = start - visit.end;
      if rest >= min_rest && rest < self.rest.preferred_minutes {
        issues.push(
          PlanIssue::new(
            IssueKind::PreferredRestUnmet,
            format!(
              "Team {team} gets {rest} minute(s) of rest before {label}; {} are preferred.",
              self.rest.preferred_minutes
            ),
          )
          .in_stage(m.stage_id, m.group_id)
          .for_match(label.clone())
          .for_team(*team)
          .conflicting_with(visit.label.clone()),
        );
      }
    }

    let end = start + self.duration;
    if let Some(horizon) = self.horizon {
      if end > horizon {
        issues.push(
          PlanIssue::new(
            IssueKind::SlotBeyondHorizon,
            format!("{label} ends at {} which is past the tournament end.", self.at(end)),
          )
          .in_stage(m.stage_id, m.group_id)
          .for_match(label.clone()),
        );
      }
    }

    timeline.occupy(Some(lane), start, end, m.match_ref(), m.stage_id, m.group_id, &teams, &label);
    Some(Placement { lane, start, end })
  }

  fn pitch_rank(&self) -> HashMap<PitchId, usize> {
    self.pitches.iter().enumerate().map(|(idx, p)| (p.id, idx)).collect()
  }

  fn at(&self, offset: i64) -> DateTime<Utc> {
    self.start + Duration::minutes(offset)
  }
}

fn allocated_match(m: &AbstractMatch, allocation: Allocation) -> AllocatedMatch {
  let mut metadata = BTreeMap::new();
  if let Some(label) = m.home.source_label() {
    metadata.insert("homeSource".to_string(), label.to_string());
  }
  if let Some(label) = m.away.source_label() {
    metadata.insert("awaySource".to_string(), label.to_string());
  }
  if let Some(position) = m.position {
    metadata.insert("bracketPosition".to_string(), position.to_string());
  }
  if let Allocation::NotMaterialized(_) = allocation {
    metadata.insert("condition".to_string(), "ifNeeded".to_string());
  }
  AllocatedMatch {
    stage_id: m.stage_id,
    group_id: m.group_id,
    round: m.round,
    bracket_position: m.position,
    home: m.home.clone(),
    away: m.away.clone(),
    allocation,
    sequence: m.sequence,
    metadata,
  }
}

/// Warns when the busiest pitch hosts more than one match more than the
/// quietest one.
pub fn pitch_load_warning(matches: &[AllocatedMatch], pitches: &[Pitch]) -> Option<PlanIssue> {
  let mut counts = pitches.iter().map(|p| (p.id, 0usize)).collect::<BTreeMap<_, _>>();
  for slot in matches.iter().filter_map(|m| m.slot()) {
    if let Some(count) = counts.get_mut(&slot.pitch_id) {
      *count += 1;
    }
  }
  let busiest = counts.iter().max_by_key(|(_, c)| **c)?;
  let quietest = counts.iter().min_by_key(|(_, c)| **c)?;
  if busiest.1 - quietest.1 <= 1 {
    return None;
  }
  Some(PlanIssue::new(
    IssueKind::UnevenPitchLoad,
    format!(
      "Pitch {} hosts {} matches while pitch {} hosts {}.",
      busiest.0, busiest.1, quietest.0, quietest.1
    ),
  ))
}

/// Statistics over the scheduled matches of a plan. Unmaterialized matches
/// are not counted.
pub fn plan_stats(matches: &[AllocatedMatch], pitches: &[Pitch]) -> PlanStats {
  let mut stats = PlanStats {
    pitch_minutes: pitches.iter().map(|p| (p.id, 0)).collect(),
    pitch_utilization: pitches.iter().map(|p| (p.id, 0.0)).collect(),
    ..PlanStats::default()
  };
  let scheduled = matches.iter().filter_map(|m| m.slot().map(|s| (m, s))).collect::<Vec<_>>();
  let (Some(first), Some(last)) = (
    scheduled.iter().map(|(_, s)| s.start).min(),
    scheduled.iter().map(|(_, s)| s.end).max(),
  ) else {
    return stats;
  };

  let span = (last - first).num_minutes();
  stats.total_matches = scheduled.len();
  stats.total_duration_minutes = span;
  stats.estimated_end = Some(last);
  for (_, slot) in &scheduled {
    *stats.pitch_minutes.entry(slot.pitch_id).or_insert(0) += (slot.end - slot.start).num_minutes();
  }
  if span > 0 {
    stats.pitch_utilization = stats
      .pitch_minutes
      .iter()
      .map(|(id, minutes)| (*id, *minutes as f64 / span as f64))
      .collect();
  }

  let mut windows: HashMap<TeamId, Vec<(DateTime<Utc>, DateTime<Utc>)>> = HashMap::new();
  for (m, slot) in &scheduled {
    for team in m.team_ids() {
      windows.entry(team).or_default().push((slot.start, slot.end));
    }
  }
  let mut rests = Vec::new();
  for list in windows.values_mut() {
    list.sort();
    rests.extend(list.windows(2).map(|pair| (pair[1].0 - pair[0].1).num_minutes()));
  }
  if !rests.is_empty() {
    stats.average_rest_minutes = Some(rests.iter().sum::<i64>() as f64 / rests.len() as f64);
  }
  stats
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bracket::{BracketPosition, MatchCondition, Participant};
  use chrono::TimeZone;

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 6, 9, 0, 0).unwrap()
  }

  fn timing(pitches: u32, duration: i64, transition: i64) -> TimingConfig {
    TimingConfig {
      start: Some(start()),
      match_duration_minutes: duration,
      transition_minutes: transition,
      pitches: (1..=pitches)
        .map(|id| Pitch {
          id,
          name: format!("Pitch {id}"),
        })
        .collect(),
      end: None,
    }
  }

  fn rest(minimum: i64, preferred: i64) -> RestConstraint {
    RestConstraint {
      minimum_minutes: minimum,
      preferred_minutes: preferred,
    }
  }

  fn fixture(round: u32, sequence: u32, home: TeamId, away: TeamId) -> AbstractMatch {
    AbstractMatch {
      stage_id: 1,
      group_id: Some(10),
      round,
      position: None,
      home: Participant::Known(home),
      away: Participant::Known(away),
      condition: None,
      sequence,
    }
  }

  fn minutes(slot: &TimeSlot) -> (i64, i64) {
    ((slot.start - start()).num_minutes(), (slot.end - start()).num_minutes())
  }

  #[test]
  fn same_pitch_matches_keep_transition_gap() {
    let allocator = Allocator::new(&timing(1, 10, 5), rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(1, 2, 3, 4), fixture(1, 3, 5, 6)]);
    let windows = outcome
      .matches
      .iter()
      .map(|m| minutes(m.slot().unwrap()))
      .collect::<Vec<_>>();
    assert_eq!(windows, vec![(0, 10), (15, 25), (30, 40)]);
    assert!(outcome.errors.is_empty());
  }

  #[test]
  fn independent_matches_spread_over_pitches() {
    let allocator = Allocator::new(&timing(2, 10, 5), rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(1, 2, 3, 4)]);
    let slots = outcome.matches.iter().map(|m| m.slot().unwrap()).collect::<Vec<_>>();
    assert_eq!(slots[0].pitch_id, 1);
    assert_eq!(slots[1].pitch_id, 2);
    assert_eq!(slots[0].start, slots[1].start);
    assert_eq!((slots[0].match_number, slots[1].match_number), (1, 2));
  }

  #[test]
  fn rest_pushes_back_a_teams_next_match() {
    let allocator = Allocator::new(&timing(2, 10, 5), rest(15, 20), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(2, 2, 1, 3)]);
    let second = outcome.matches[1].slot().unwrap();
    assert_eq!(minutes(second), (25, 35));
    assert!(outcome.errors.is_empty());
    let warning = &outcome.warnings[0];
    assert_eq!(warning.kind, IssueKind::PreferredRestUnmet);
    assert_eq!(warning.team_id, Some(1));
    assert_eq!(outcome.stats.average_rest_minutes, Some(15.0));
  }

  #[test]
  fn rest_beyond_look_ahead_is_an_error() {
    let allocator = Allocator::new(&timing(2, 10, 5), rest(15, 30), 0).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(2, 2, 1, 3)]);
    assert_eq!(outcome.matches.len(), 2);
    let error = &outcome.errors[0];
    assert_eq!(error.kind, IssueKind::MinimumRestUnmet);
    assert_eq!(error.team_id, Some(1));
    assert_eq!(error.conflicting_match.as_deref(), Some("stage 1 group 10 round 1 (team 1 v team 2)"));
  }

  #[test]
  fn bracket_matches_wait_for_their_sources() {
    let mut matches = crate::pairing::generate(&knockout_stage(4), None).matches;
    matches.reverse();
    let allocator = Allocator::new(&timing(4, 10, 0), rest(15, 15), 120).unwrap();
    let outcome = allocator.allocate(&matches);
    let final_match = outcome
      .matches
      .iter()
      .find(|m| m.bracket_position == Some(BracketPosition::Winners { round: 2, index: 1 }))
      .unwrap();
    assert_eq!(minutes(final_match.slot().unwrap()), (25, 35));
    assert_eq!(final_match.metadata.get("homeSource").map(String::as_str), Some("Winner of W-1-1"));
  }

  #[test]
  fn stage_gap_holds_back_next_stage() {
    let mut stages = vec![knockout_stage(2), knockout_stage(2)];
    stages[1].id = 2;
    stages[1].order = 2;
    stages[1].gap_before_minutes = 30;
    let mut matches = crate::pairing::generate(&stages[0], None).matches;
    let mut later = crate::pairing::generate(&stages[1], None).matches;
    for m in later.iter_mut() {
      m.home = Participant::Known(m.home.team_id().unwrap() + 10);
      m.away = Participant::Known(m.away.team_id().unwrap() + 10);
    }
    matches.extend(later);
    let allocator = Allocator::new(&timing(2, 10, 0), rest(0, 0), 120)
      .unwrap()
      .with_stages(&stages);
    let outcome = allocator.allocate(&matches);
    let second = outcome.matches.iter().find(|m| m.stage_id == 2).unwrap();
    assert_eq!(minutes(second.slot().unwrap()), (40, 50));
  }

  #[test]
  fn matches_past_the_end_time_are_errors() {
    let mut config = timing(1, 30, 0);
    config.end = Some(start() + Duration::minutes(45));
    let allocator = Allocator::new(&config, rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(1, 2, 3, 4)]);
    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, IssueKind::SlotBeyondHorizon);
  }

  #[test]
  fn conditional_matches_stay_unmaterialized() {
    let grand_final = MatchRef {
      stage_id: 1,
      group_id: None,
      position: BracketPosition::GrandFinal,
    };
    let mut reset = fixture(3, 2, 1, 2);
    reset.position = Some(BracketPosition::GrandFinalReset);
    reset.condition = Some(MatchCondition::GrandFinalReset { grand_final });
    let allocator = Allocator::new(&timing(1, 10, 0), rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[reset, fixture(1, 1, 3, 4)]);
    assert!(outcome.matches[0].slot().is_some());
    assert!(matches!(outcome.matches[1].allocation, Allocation::NotMaterialized(_)));
    assert_eq!(outcome.matches[1].metadata.get("condition").map(String::as_str), Some("ifNeeded"));
    assert_eq!(outcome.stats.total_matches, 1);
  }

  fn plan_of(outcome: AllocationOutcome) -> SchedulePlan {
    SchedulePlan {
      tournament_id: 1,
      stage_ids: vec![1],
      matches: outcome.matches,
      byes: Vec::new(),
      stats: outcome.stats,
      warnings: outcome.warnings,
      errors: outcome.errors,
    }
  }

  fn grand_final_pair() -> (AbstractMatch, AbstractMatch) {
    let mut grand_final = fixture(1, 1, 1, 2);
    grand_final.group_id = None;
    grand_final.position = Some(BracketPosition::GrandFinal);
    let mut reset = fixture(3, 9, 1, 2);
    reset.group_id = None;
    reset.position = Some(BracketPosition::GrandFinalReset);
    reset.condition = Some(MatchCondition::GrandFinalReset {
      grand_final: grand_final.match_ref().unwrap(),
    });
    (grand_final, reset)
  }

  #[test]
  fn materialized_match_is_numbered_by_start() {
    let allocator = Allocator::new(&timing(1, 10, 0), rest(15, 15), 120).unwrap();
    let (grand_final, reset) = grand_final_pair();
    let outcome = allocator.allocate(&[grand_final, fixture(2, 2, 3, 4), fixture(3, 3, 3, 5), reset.clone()]);
    let mut plan = plan_of(outcome);
    assert!(plan.is_successful(), "{:?}", plan.errors);

    let mut materialized = reset;
    materialized.condition = None;
    allocator.allocate_materialized(&mut plan, &materialized).unwrap();

    let order = plan
      .scheduled()
      .map(|(m, slot)| (m.describe(), minutes(slot).0, slot.match_number))
      .collect::<Vec<_>>();
    assert_eq!(order.iter().map(|o| o.1).collect::<Vec<_>>(), vec![0, 10, 25, 35]);
    assert_eq!(order.iter().map(|o| o.2).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    let reset_slot = plan.find(&materialized.match_ref().unwrap()).and_then(|m| m.slot()).unwrap();
    assert_eq!(reset_slot.match_number, 3);
    assert_eq!(plan.stats.total_matches, 4);
  }

  #[test]
  fn materializing_refreshes_the_pitch_load_warning() {
    let (grand_final, reset) = grand_final_pair();
    let single = Allocator::new(&timing(1, 10, 0), rest(0, 0), 120).unwrap();
    let mut plan = plan_of(single.allocate(&[grand_final, fixture(1, 2, 3, 4), reset.clone()]));

    // A second pitch opened after the plan was made.
    let allocator = Allocator::new(&timing(2, 10, 0), rest(0, 0), 120).unwrap();
    plan.warnings.extend(pitch_load_warning(&plan.matches, &timing(2, 10, 0).pitches));
    assert!(plan.warnings.iter().any(|w| w.kind == IssueKind::UnevenPitchLoad));

    let mut materialized = reset;
    materialized.condition = None;
    allocator.allocate_materialized(&mut plan, &materialized).unwrap();
    let reset_slot = plan.find(&materialized.match_ref().unwrap()).and_then(|m| m.slot()).unwrap();
    assert_eq!(reset_slot.pitch_id, 2);
    assert!(plan.warnings.iter().all(|w| w.kind != IssueKind::UnevenPitchLoad));
  }

  #[test]
  fn uneven_pitch_load_is_reported() {
    let allocator = Allocator::new(&timing(1, 10, 0), rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(1, 2, 3, 4), fixture(1, 3, 5, 6)]);
    assert!(pitch_load_warning(&outcome.matches, &timing(1, 10, 0).pitches).is_none());
    let issue = pitch_load_warning(&outcome.matches, &timing(2, 10, 0).pitches).unwrap();
    assert_eq!(issue.kind, IssueKind::UnevenPitchLoad);
  }

  #[test]
  fn timeline_rebuilds_from_plan() {
    let allocator = Allocator::new(&timing(2, 10, 5), rest(0, 0), 120).unwrap();
    let outcome = allocator.allocate(&[fixture(1, 1, 1, 2), fixture(1, 2, 3, 4), fixture(2, 3, 1, 3)]);
    let timeline = Timeline::from_plan(&timing(2, 10, 5).pitches, start(), &outcome.matches);
    assert_eq!(timeline.busy(1), Some(&[(0, 10), (15, 25)][..]));
    assert_eq!(timeline.last_end(1), Some(25));
    assert_eq!(timeline.last_end(4), Some(10));
  }

  #[test]
  fn invalid_timing_is_rejected() {
    let mut config = timing(0, 10, 0);
    assert_eq!(
      Allocator::new(&config, rest(15, 30), 120).err(),
      Some(ConfigError::NoActivePitches)
    );
    config = timing(1, 10, 0);
    config.start = None;
    assert_eq!(
      Allocator::new(&config, rest(15, 30), 120).err(),
      Some(ConfigError::MissingStartTime)
    );
    assert!(matches!(
      Allocator::new(&timing(1, 0, 0), rest(15, 30), 120),
      Err(ConfigError::InvalidTiming(_))
    ));
  }

  fn knockout_stage(teams: u32) -> StageConfig {
    use crate::types::{GroupConfig, RoundRobinKind, StageFormat, TeamAssignment};
    StageConfig {
      id: 1,
      name: "Knockout".to_string(),
      order: 1,
      format: StageFormat::Knockout,
      gap_before_minutes: 0,
      groups: vec![GroupConfig {
        id: 10,
        name: "Bracket".to_string(),
        order: 1,
        round_robin: RoundRobinKind::Single,
        teams: (1..=teams)
          .map(|t| TeamAssignment {
            team_id: t,
            name: format!("Team {t}"),
            seed: None,
          })
          .collect(),
      }],
      third_place_match: false,
      grand_final_reset: true,
      qualifiers: None,
    }
  }
}
