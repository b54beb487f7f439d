use std::collections::HashSet;
use tracing::debug;

use crate::bracket::{
  rank_label, BracketPosition, MatchCondition, MatchRef, Participant, PendingSlot, SlotRole, SlotSource,
};
use crate::types::{
  AbstractMatch, Bye, GroupConfig, GroupId, IssueKind, PlanIssue, RoundRobinKind, StageConfig, StageFormat,
  StageId, TeamAssignment, GROUPED_HYBRID_GROUP_SIZE,
};

/// A stage entrant before seeding: a confirmed team or a qualifier placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct Entrant {
  pub participant: Participant,
  pub seed: Option<u32>,
}

impl Entrant {
  pub fn from_team(team: &TeamAssignment) -> Self {
    Entrant {
      participant: Participant::Known(team.team_id),
      seed: team.seed,
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct GeneratedStage {
  pub matches: Vec<AbstractMatch>,
  pub byes: Vec<Bye>,
  pub issues: Vec<PlanIssue>,
}

/// One fixture of a circle-method schedule, as indexes into the team list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pairing {
  pub round: u32,
  pub home: usize,
  pub away: usize,
}

#[derive(Clone, Debug)]
enum Feed {
  Slot(Participant),
  Empty,
}

#[derive(Clone, Debug)]
struct Outcome {
  winner: Feed,
  loser: Feed,
  played: bool,
}

struct StageBuilder {
  stage_id: StageId,
  group_id: Option<GroupId>,
  group_name: Option<String>,
  next_sequence: u32,
  generated: GeneratedStage,
}

impl StageBuilder {
  fn new(stage_id: StageId) -> Self {
    StageBuilder {
      stage_id,
      group_id: None,
      group_name: None,
      next_sequence: 1,
      generated: GeneratedStage::default(),
    }
  }

  fn enter_group(&mut self, group: Option<&GroupConfig>) {
    self.group_id = group.map(|g| g.id);
    self.group_name = group.map(|g| g.name.clone());
  }

  fn issue(&mut self, kind: IssueKind, message: String) {
    let issue = PlanIssue::new(kind, message).in_stage(self.stage_id, self.group_id);
    self.generated.issues.push(issue);
  }

  fn push(
    &mut self,
    round: u32,
    position: Option<BracketPosition>,
    home: Participant,
    away: Participant,
    condition: Option<MatchCondition>,
  ) {
    let sequence = self.next_sequence;
    self.next_sequence += 1;
    self.generated.matches.push(AbstractMatch {
      stage_id: self.stage_id,
      group_id: self.group_id,
      round,
      position,
      home,
      away,
      condition,
      sequence,
    });
  }

  /// Creates the match for two feeds. A missing side collapses into a bye: no
  /// match is generated and the present side advances as the winner.
  fn pair(&mut self, position: BracketPosition, round: u32, a: Feed, b: Feed) -> Outcome {
    match (a, b) {
      (Feed::Slot(home), Feed::Slot(away)) => {
        let from = MatchRef {
          stage_id: self.stage_id,
          group_id: self.group_id,
          position,
        };
        self.push(round, Some(position), home, away, None);
        let group_name = self.group_name.as_deref();
        Outcome {
          winner: Feed::Slot(Participant::from_match(from, SlotRole::Winner, group_name)),
          loser: Feed::Slot(Participant::from_match(from, SlotRole::Loser, group_name)),
          played: true,
        }
      }
      (Feed::Slot(present), Feed::Empty) | (Feed::Empty, Feed::Slot(present)) => {
        self.generated.byes.push(Bye {
          stage_id: self.stage_id,
          group_id: self.group_id,
          position,
          participant: present.clone(),
        });
        Outcome {
          winner: Feed::Slot(present),
          loser: Feed::Empty,
          played: false,
        }
      }
      (Feed::Empty, Feed::Empty) => Outcome {
        winner: Feed::Empty,
        loser: Feed::Empty,
        played: false,
      },
    }
  }
}

/// Produces the abstract matches of one stage. `qualified` replaces the
/// stage's own teams for elimination formats fed by an earlier stage.
pub fn generate(stage: &StageConfig, qualified: Option<&[Entrant]>) -> GeneratedStage {
  let mut out = StageBuilder::new(stage.id);
  match stage.format {
    StageFormat::RoundRobin | StageFormat::GroupStage => {
      for group in stage.sorted_groups() {
        round_robin_group(&mut out, group);
      }
    }
    StageFormat::GroupedHybrid => {
      for group in stage.sorted_groups() {
        grouped_hybrid_group(&mut out, group);
      }
    }
    StageFormat::Knockout | StageFormat::Final | StageFormat::DoubleElimination => {
      let entrants = match qualified {
        Some(list) => list.to_vec(),
        None => stage_entrants(stage),
      };
      if entrants.len() < 2 {
        out.issue(
          IssueKind::InsufficientTeams,
          format!("Stage {} has {} entrant(s); at least 2 are needed.", stage.name, entrants.len()),
        );
      } else if stage.format == StageFormat::DoubleElimination {
        double_elimination(&mut out, &entrants, stage.grand_final_reset);
      } else {
        knockout(&mut out, &entrants, stage.third_place_match);
      }
    }
  }
  debug!(
    stage_id = stage.id,
    matches = out.generated.matches.len(),
    byes = out.generated.byes.len(),
    "generated stage pairings"
  );
  out.generated
}

/// All teams of a stage in group order, each group in registration order.
pub fn stage_entrants(stage: &StageConfig) -> Vec<Entrant> {
  stage
    .sorted_groups()
    .into_iter()
    .flat_map(|group| group.teams.iter().map(Entrant::from_team))
    .collect()
}

/// Placeholder entrants for the top `per_group` finishers of each group of
/// `source`, seeded rank by rank in group order.
pub fn qualifier_entrants(source: &StageConfig, per_group: u32) -> Vec<Entrant> {
  let groups = source.sorted_groups();
  let mut entrants = Vec::with_capacity(groups.len() * per_group as usize);
  for rank in 1..=per_group {
    for group in &groups {
      let slot_source = match (source.format, rank) {
        (StageFormat::GroupedHybrid, 1 | 2) => {
          let position = if rank == 1 {
            BracketPosition::Winners { round: 2, index: 1 }
          } else {
            BracketPosition::Losers { round: 2, index: 1 }
          };
          SlotSource::Match {
            from: MatchRef {
              stage_id: source.id,
              group_id: Some(group.id),
              position,
            },
            role: SlotRole::Winner,
          }
        }
        _ => SlotSource::GroupRank {
          stage_id: source.id,
          group_id: group.id,
          rank,
        },
      };
      let seed = entrants.len() as u32 + 1;
      entrants.push(Entrant {
        participant: Participant::Pending(PendingSlot {
          source: slot_source,
          label: rank_label(&group.name, rank),
        }),
        seed: Some(seed),
      });
    }
  }
  entrants
}

/// Circle method: the first slot stays fixed while the rest rotate one place
/// per round. With an odd count the fixed slot is the bye, so every team sits
/// out exactly one round and home fixtures split evenly.
pub fn round_robin_pairings(count: usize, kind: RoundRobinKind) -> Vec<Pairing> {
  if count < 2 {
    return Vec::new();
  }
  let mut slots: Vec<Option<usize>> = Vec::with_capacity(count + 1);
  if count % 2 == 1 {
    slots.push(None);
  }
  slots.extend((0..count).map(Some));
  let size = slots.len();
  let rounds = size - 1;

  let mut pairings = Vec::with_capacity(count * (count - 1) / 2);
  for round in 0..rounds {
    for i in 0..size / 2 {
      let (Some(a), Some(b)) = (slots[i], slots[size - 1 - i]) else {
        continue;
      };
      let (home, away) = if i == 0 && round % 2 == 1 { (b, a) } else { (a, b) };
      pairings.push(Pairing {
        round: round as u32 + 1,
        home,
        away,
      });
    }
    if let Some(last) = slots.pop() {
      slots.insert(1, last);
    }
  }

  if kind == RoundRobinKind::Double {
    let second_leg = pairings
      .iter()
      .map(|p| Pairing {
        round: p.round + rounds as u32,
        home: p.away,
        away: p.home,
      })
      .collect::<Vec<_>>();
    pairings.extend(second_leg);
  }
  pairings
}

fn round_robin_group(out: &mut StageBuilder, group: &GroupConfig) {
  out.enter_group(Some(group));
  if group.teams.len() < 2 {
    out.issue(
      IssueKind::InsufficientTeams,
      format!("{} has {} team(s); at least 2 are needed.", group.name, group.teams.len()),
    );
    return;
  }
  for pairing in round_robin_pairings(group.teams.len(), group.round_robin) {
    let home = Participant::Known(group.teams[pairing.home].team_id);
    let away = Participant::Known(group.teams[pairing.away].team_id);
    out.push(pairing.round, None, home, away, None);
  }
}

/// Four-team double-elimination group: seeds 1v4 and 2v3, a winners match
/// deciding first place, an elimination match between the opening losers and
/// a decider for second place.
fn grouped_hybrid_group(out: &mut StageBuilder, group: &GroupConfig) {
  out.enter_group(Some(group));
  if group.teams.len() != GROUPED_HYBRID_GROUP_SIZE {
    let kind = if group.teams.len() < 2 {
      IssueKind::InsufficientTeams
    } else {
      IssueKind::UnsupportedGroupSize
    };
    out.issue(
      kind,
      format!(
        "{} has {} team(s); grouped hybrid groups need exactly {}.",
        group.name,
        group.teams.len(),
        GROUPED_HYBRID_GROUP_SIZE
      ),
    );
    return;
  }
  let entrants = group.teams.iter().map(Entrant::from_team).collect::<Vec<_>>();
  let seeded = seeded_participants(&entrants);
  let feed = |rank: usize| Feed::Slot(seeded[rank].clone());

  let opening_a = out.pair(BracketPosition::Winners { round: 1, index: 1 }, 1, feed(0), feed(3));
  let opening_b = out.pair(BracketPosition::Winners { round: 1, index: 2 }, 1, feed(1), feed(2));
  let winners = out.pair(
    BracketPosition::Winners { round: 2, index: 1 },
    2,
    opening_a.winner,
    opening_b.winner,
  );
  let elimination = out.pair(
    BracketPosition::Losers { round: 1, index: 1 },
    2,
    opening_a.loser,
    opening_b.loser,
  );
  out.pair(
    BracketPosition::Losers { round: 2, index: 1 },
    3,
    winners.loser,
    elimination.winner,
  );
}

fn knockout(out: &mut StageBuilder, entrants: &[Entrant], third_place: bool) {
  out.enter_group(None);
  let winners = winners_bracket(out, seeded_feeds(entrants));
  if third_place && winners.len() >= 2 {
    let semis = &winners[winners.len() - 2];
    let (a, b) = (semis[0].loser.clone(), semis[1].loser.clone());
    out.pair(BracketPosition::ThirdPlace, winners.len() as u32, a, b);
  }
}

/// Winners bracket as in single elimination; every winners-round loser drops
/// into the losers bracket, whose odd rounds merge survivors and whose even
/// rounds take the next batch of winners-bracket losers.
fn double_elimination(out: &mut StageBuilder, entrants: &[Entrant], allow_reset: bool) {
  out.enter_group(None);
  let winners = winners_bracket(out, seeded_feeds(entrants));
  let rounds = winners.len();
  let mut losers: Vec<Vec<Outcome>> = Vec::new();

  for i in 1..rounds {
    let count = winners[i].len();
    let odd_round = (i * 2 - 1) as u32;
    let mut odd = Vec::with_capacity(count);
    for j in 0..count {
      let (a, b) = if i == 1 {
        (winners[0][j * 2].loser.clone(), winners[0][j * 2 + 1].loser.clone())
      } else {
        let prev_even = &losers[losers.len() - 1];
        (prev_even[j * 2].winner.clone(), prev_even[j * 2 + 1].winner.clone())
      };
      let position = BracketPosition::Losers {
        round: odd_round,
        index: j as u32 + 1,
      };
      odd.push(out.pair(position, odd_round + 1, a, b));
    }

    let even_round = (i * 2) as u32;
    let mut even = Vec::with_capacity(count);
    for j in 0..count {
      let position = BracketPosition::Losers {
        round: even_round,
        index: j as u32 + 1,
      };
      let a = odd[j].winner.clone();
      let b = winners[i][j].loser.clone();
      even.push(out.pair(position, even_round + 1, a, b));
    }
    losers.push(odd);
    losers.push(even);
  }

  let winners_final = &winners[rounds - 1][0];
  let champion = winners_final.winner.clone();
  let challenger = match losers.last() {
    Some(round) => round[0].winner.clone(),
    None => winners_final.loser.clone(),
  };
  let grand_final_round = rounds as u32 * 2;
  let grand_final = out.pair(BracketPosition::GrandFinal, grand_final_round, champion, challenger);

  if allow_reset && grand_final.played {
    let grand_final_ref = MatchRef {
      stage_id: out.stage_id,
      group_id: None,
      position: BracketPosition::GrandFinal,
    };
    if let (Feed::Slot(home), Feed::Slot(away)) = (grand_final.winner, grand_final.loser) {
      out.push(
        grand_final_round + 1,
        Some(BracketPosition::GrandFinalReset),
        home,
        away,
        Some(MatchCondition::GrandFinalReset {
          grand_final: grand_final_ref,
        }),
      );
    }
  }
}

fn winners_bracket(out: &mut StageBuilder, first_round: Vec<Feed>) -> Vec<Vec<Outcome>> {
  let mut rounds = Vec::new();
  let mut current = first_round;
  let mut round = 1u32;
  while current.len() > 1 {
    let mut outcomes = Vec::with_capacity(current.len() / 2);
    for (i, pair) in current.chunks(2).enumerate() {
      let position = BracketPosition::Winners {
        round,
        index: i as u32 + 1,
      };
      outcomes.push(out.pair(position, round, pair[0].clone(), pair[1].clone()));
    }
    current = outcomes.iter().map(|o| o.winner.clone()).collect();
    rounds.push(outcomes);
    round += 1;
  }
  rounds
}

fn seeded_feeds(entrants: &[Entrant]) -> Vec<Feed> {
  let seeded = seeded_participants(entrants);
  let size = bracket_size(seeded.len());
  seed_positions(size as u32)
    .into_iter()
    .map(|seed| {
      seeded
        .get(seed as usize - 1)
        .cloned()
        .map(Feed::Slot)
        .unwrap_or(Feed::Empty)
    })
    .collect()
}

/// Seed order: explicit unique seeds win, the rest take the lowest free
/// seeds in registration order. Index 0 is the top seed.
pub fn seeded_participants(entrants: &[Entrant]) -> Vec<Participant> {
  let mut used_seeds = HashSet::new();
  let mut assigned: Vec<(u32, &Entrant)> = Vec::with_capacity(entrants.len());
  for entrant in entrants {
    let seed = entrant.seed.filter(|s| *s > 0 && !used_seeds.contains(s));
    if let Some(seed) = seed {
      used_seeds.insert(seed);
    }
    assigned.push((seed.unwrap_or(0), entrant));
  }

  let mut next_seed = 1u32;
  for (seed, _) in assigned.iter_mut() {
    if *seed != 0 {
      continue;
    }
    while used_seeds.contains(&next_seed) {
      next_seed += 1;
    }
    *seed = next_seed;
    used_seeds.insert(next_seed);
    next_seed += 1;
  }

  assigned.sort_by_key(|(seed, _)| *seed);
  assigned
    .into_iter()
    .map(|(_, entrant)| entrant.participant.clone())
    .collect()
}

/// Bracket order of seeds: seed k meets seed n+1-k in every sub-bracket.
pub fn seed_positions(size: u32) -> Vec<u32> {
  let mut seeds = vec![1u32];
  while seeds.len() < size as usize {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}

pub fn bracket_size(entrants: usize) -> usize {
  entrants.max(2).next_power_of_two()
}
