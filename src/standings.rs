use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::types::{CompletedMatch, GroupConfig, RoundRobinKind, StageId, TeamId};

/// Criteria applied, in order, to teams level on points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
  GoalDifference,
  GoalsFor,
  /// Points earned in the matches between the teams still level.
  HeadToHead,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StandingsRules {
  pub points_for_win: u32,
  pub points_for_draw: u32,
  pub points_for_loss: u32,
  pub tie_breaks: Vec<TieBreak>,
}

impl Default for StandingsRules {
  fn default() -> Self {
    StandingsRules {
      points_for_win: 3,
      points_for_draw: 1,
      points_for_loss: 0,
      tie_breaks: vec![TieBreak::GoalDifference, TieBreak::GoalsFor],
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
  pub team_id: TeamId,
  pub name: String,
  pub position: u32,
  pub played: u32,
  pub won: u32,
  pub drawn: u32,
  pub lost: u32,
  pub goals_for: u32,
  pub goals_against: u32,
  pub goal_difference: i64,
  pub points: u32,
}

#[derive(Clone, Copy)]
enum Criterion {
  Points,
  Rule(TieBreak),
}

/// Ranked table of one group. Only this group's round-robin results count;
/// elimination and penalty-decided matches are ignored. Teams still level
/// after every criterion keep registration order.
pub fn standings(
  stage_id: StageId,
  group: &GroupConfig,
  matches: &[CompletedMatch],
  rules: &StandingsRules,
) -> Vec<TeamStanding> {
  let counted = group_matches(stage_id, group, matches);
  let mut rows = group
    .teams
    .iter()
    .map(|t| TeamStanding {
      team_id: t.team_id,
      name: t.name.clone(),
      ..TeamStanding::default()
    })
    .collect::<Vec<_>>();
  let index = rows
    .iter()
    .enumerate()
    .map(|(i, r)| (r.team_id, i))
    .collect::<HashMap<_, _>>();

  for m in &counted {
    let (home_score, away_score) = (m.result.home_score, m.result.away_score);
    for (team, scored, conceded) in [(m.home, home_score, away_score), (m.away, away_score, home_score)] {
      let Some(row) = index.get(&team).and_then(|i| rows.get_mut(*i)) else {
        continue;
      };
      row.played += 1;
      row.goals_for += scored;
      row.goals_against += conceded;
      if scored > conceded {
        row.won += 1;
        row.points += rules.points_for_win;
      } else if scored == conceded {
        row.drawn += 1;
        row.points += rules.points_for_draw;
      } else {
        row.lost += 1;
        row.points += rules.points_for_loss;
      }
    }
  }
  for row in rows.iter_mut() {
    row.goal_difference = row.goals_for as i64 - row.goals_against as i64;
  }

  let mut criteria = vec![Criterion::Points];
  criteria.extend(rules.tie_breaks.iter().map(|t| Criterion::Rule(*t)));
  rank(&mut rows, &criteria, &counted, rules, &index);
  for (i, row) in rows.iter_mut().enumerate() {
    row.position = i as u32 + 1;
  }
  rows
}

/// Sorts by the first criterion, then re-ranks every run of level teams by
/// the remaining ones. Head-to-head is evaluated inside the run only.
fn rank(
  rows: &mut [TeamStanding],
  criteria: &[Criterion],
  matches: &[&CompletedMatch],
  rules: &StandingsRules,
  registration: &HashMap<TeamId, usize>,
) {
  if rows.len() < 2 {
    return;
  }
  let Some((criterion, rest)) = criteria.split_first() else {
    rows.sort_by_key(|r| registration.get(&r.team_id).copied().unwrap_or(usize::MAX));
    return;
  };

  let keys: HashMap<TeamId, i64> = match criterion {
    Criterion::Points => rows.iter().map(|r| (r.team_id, r.points as i64)).collect(),
    Criterion::Rule(TieBreak::GoalDifference) => rows.iter().map(|r| (r.team_id, r.goal_difference)).collect(),
    Criterion::Rule(TieBreak::GoalsFor) => rows.iter().map(|r| (r.team_id, r.goals_for as i64)).collect(),
    Criterion::Rule(TieBreak::HeadToHead) => head_to_head_points(rows, matches, rules),
  };
  let key = |r: &TeamStanding| keys.get(&r.team_id).copied().unwrap_or(0);
  rows.sort_by_key(|r| Reverse(key(r)));

  let mut start = 0;
  while start < rows.len() {
    let level = key(&rows[start]);
    let mut end = start + 1;
    while end < rows.len() && key(&rows[end]) == level {
      end += 1;
    }
    rank(&mut rows[start..end], rest, matches, rules, registration);
    start = end;
  }
}

fn head_to_head_points(
  rows: &[TeamStanding],
  matches: &[&CompletedMatch],
  rules: &StandingsRules,
) -> HashMap<TeamId, i64> {
  let mut points = rows.iter().map(|r| (r.team_id, 0i64)).collect::<HashMap<_, _>>();
  for m in matches {
    if !points.contains_key(&m.home) || !points.contains_key(&m.away) {
      continue;
    }
    let (home, away) = match m.result.home_score.cmp(&m.result.away_score) {
      std::cmp::Ordering::Greater => (rules.points_for_win, rules.points_for_loss),
      std::cmp::Ordering::Equal => (rules.points_for_draw, rules.points_for_draw),
      std::cmp::Ordering::Less => (rules.points_for_loss, rules.points_for_win),
    };
    *points.entry(m.home).or_insert(0) += home as i64;
    *points.entry(m.away).or_insert(0) += away as i64;
  }
  points
}

fn group_matches<'a>(stage_id: StageId, group: &GroupConfig, matches: &'a [CompletedMatch]) -> Vec<&'a CompletedMatch> {
  let members = group.teams.iter().map(|t| t.team_id).collect::<Vec<_>>();
  matches
    .iter()
    .filter(|m| m.stage_id == stage_id && m.group_id == Some(group.id))
    .filter(|m| !m.elimination && !m.result.decided_by_penalties())
    .filter(|m| members.contains(&m.home) && members.contains(&m.away))
    .collect()
}

pub fn ranking_ids(table: &[TeamStanding]) -> Vec<TeamId> {
  table.iter().map(|r| r.team_id).collect()
}

/// True once every fixture of the group's round robin has a result.
pub fn group_complete(stage_id: StageId, group: &GroupConfig, matches: &[CompletedMatch]) -> bool {
  let n = group.teams.len();
  let legs = match group.round_robin {
    RoundRobinKind::Single => 1,
    RoundRobinKind::Double => 2,
  };
  n >= 2 && group_matches(stage_id, group, matches).len() >= n * (n - 1) / 2 * legs
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{MatchResult, TeamAssignment};

  fn group(names: &[&str]) -> GroupConfig {
    GroupConfig {
      id: 10,
      name: "Group A".to_string(),
      order: 1,
      round_robin: RoundRobinKind::Single,
      teams: names
        .iter()
        .enumerate()
        .map(|(i, name)| TeamAssignment {
          team_id: i as u32 + 1,
          name: name.to_string(),
          seed: None,
        })
        .collect(),
    }
  }

  fn played(home: TeamId, away: TeamId, home_score: u32, away_score: u32) -> CompletedMatch {
    CompletedMatch {
      stage_id: 1,
      group_id: Some(10),
      home,
      away,
      result: MatchResult::new(home_score, away_score),
      elimination: false,
    }
  }

  #[test]
  fn table_orders_by_points_then_goal_difference() {
    let abc = group(&["A", "B", "C"]);
    let results = vec![played(1, 2, 2, 0), played(2, 3, 1, 1), played(1, 3, 0, 0)];
    let table = standings(1, &abc, &results, &StandingsRules::default());
    assert_eq!(ranking_ids(&table), vec![1, 3, 2]);

    let a = &table[0];
    assert_eq!((a.played, a.won, a.drawn, a.lost), (2, 1, 1, 0));
    assert_eq!((a.points, a.goal_difference, a.position), (4, 2, 1));
    let c = &table[1];
    assert_eq!((c.points, c.goal_difference, c.goals_for, c.goals_against), (2, 0, 1, 1));
    let b = &table[2];
    assert_eq!((b.points, b.goal_difference, b.position), (1, -2, 3));
  }

  #[test]
  fn goals_for_separates_equal_goal_difference() {
    let teams = group(&["A", "B", "C"]);
    let results = vec![played(1, 3, 3, 2), played(2, 3, 1, 0)];
    let table = standings(1, &teams, &results, &StandingsRules::default());
    assert_eq!(ranking_ids(&table), vec![1, 2, 3]);
    assert_eq!(table[0].goal_difference, table[1].goal_difference);
  }

  #[test]
  fn level_teams_keep_registration_order() {
    let teams = group(&["A", "B", "C", "D"]);
    let results = vec![played(4, 3, 0, 0), played(2, 1, 1, 1)];
    let table = standings(1, &teams, &results, &StandingsRules::default());
    assert_eq!(ranking_ids(&table), vec![1, 2, 3, 4]);
  }

  #[test]
  fn knockout_and_foreign_results_are_ignored() {
    let teams = group(&["A", "B"]);
    let mut shootout = played(1, 2, 1, 1);
    shootout.result = shootout.result.with_penalties(5, 4);
    let mut knockout = played(2, 1, 3, 0);
    knockout.elimination = true;
    let mut other_group = played(2, 1, 2, 0);
    other_group.group_id = Some(11);
    let table = standings(1, &teams, &[shootout, knockout, other_group], &StandingsRules::default());
    assert!(table.iter().all(|r| r.played == 0 && r.points == 0));
  }

  #[test]
  fn head_to_head_can_outrank_goal_difference() {
    let teams = group(&["A", "B", "C", "D"]);
    let results = vec![
      played(1, 2, 1, 0),
      played(2, 3, 4, 0),
      played(2, 4, 4, 0),
      played(1, 4, 1, 0),
      played(3, 1, 1, 0),
      played(3, 4, 0, 0),
    ];
    let default_table = standings(1, &teams, &results, &StandingsRules::default());
    assert_eq!(ranking_ids(&default_table), vec![2, 1, 3, 4]);

    let rules = StandingsRules {
      tie_breaks: vec![TieBreak::HeadToHead, TieBreak::GoalDifference, TieBreak::GoalsFor],
      ..StandingsRules::default()
    };
    let table = standings(1, &teams, &results, &rules);
    assert_eq!(ranking_ids(&table), vec![1, 2, 3, 4]);
    assert_eq!((table[0].points, table[1].points), (6, 6));
  }

  #[test]
  fn group_completes_after_every_fixture() {
    let teams = group(&["A", "B", "C"]);
    let mut results = vec![played(1, 2, 2, 0), played(2, 3, 1, 1)];
    assert!(!group_complete(1, &teams, &results));
    results.push(played(1, 3, 0, 0));
    assert!(group_complete(1, &teams, &results));
  }
}
