use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::advancement::Advancement;
use crate::allocator::Allocator;
use crate::config::EngineSettings;
use crate::errors::ConfigError;
use crate::pairing::{self, qualifier_entrants};
use crate::store::{commit_plan, MatchStore, SharedMatchStore};
use crate::types::{
  Allocation, PlanIssue, SchedulePlan, StageConfig, StageFormat, StageId, TournamentConfig, GROUPED_HYBRID_GROUP_SIZE,
};

/// Fatal checks run before anything is generated.
pub fn validate(config: &TournamentConfig) -> Result<(), ConfigError> {
  if config.stages.is_empty() {
    return Err(ConfigError::NoStages);
  }
  if config.timing.pitches.is_empty() {
    return Err(ConfigError::NoActivePitches);
  }
  if config.timing.start.is_none() {
    return Err(ConfigError::MissingStartTime);
  }

  let mut orders = HashSet::new();
  for stage in &config.stages {
    if !orders.insert(stage.order) {
      return Err(ConfigError::DuplicateStageOrder { order: stage.order });
    }
  }

  for stage in &config.stages {
    if stage.format == StageFormat::GroupedHybrid {
      for group in &stage.groups {
        if group.teams.len() != GROUPED_HYBRID_GROUP_SIZE {
          return Err(ConfigError::UnsupportedGroupSize {
            stage_id: stage.id,
            group_id: group.id,
            size: group.teams.len(),
            expected: GROUPED_HYBRID_GROUP_SIZE,
          });
        }
      }
    }
    if let Some(rule) = stage.qualifiers {
      validate_qualifiers(config, stage, rule.from_stage, rule.per_group)?;
    }
  }
  Ok(())
}

fn validate_qualifiers(
  config: &TournamentConfig,
  stage: &StageConfig,
  from_stage: u32,
  per_group: u32,
) -> Result<(), ConfigError> {
  if !stage.format.is_elimination() {
    return Err(ConfigError::QualifiersNotSupported { stage_id: stage.id });
  }
  let source = config
    .stage(from_stage)
    .filter(|source| source.order < stage.order)
    .ok_or(ConfigError::InvalidPrerequisite {
      stage_id: stage.id,
      from_stage,
    })?;
  let available = match source.format {
    StageFormat::GroupedHybrid => 2,
    StageFormat::RoundRobin | StageFormat::GroupStage => {
      source.groups.iter().map(|g| g.teams.len()).min().unwrap_or(0)
    }
    _ => 0,
  };
  if per_group == 0 || per_group as usize > available {
    return Err(ConfigError::InvalidQualifierCount {
      stage_id: stage.id,
      per_group,
    });
  }
  Ok(())
}

/// Generates every stage in stage order and allocates the combined match list.
/// Stage and match scoped problems are collected in the plan; only
/// configuration errors abort.
pub fn generate_plan(config: &TournamentConfig, settings: &EngineSettings) -> Result<SchedulePlan, ConfigError> {
  validate(config)?;
  let rest = config.rest.unwrap_or(settings.rest);
  let allocator = Allocator::new(&config.timing, rest, settings.look_ahead_minutes)?.with_stages(&config.stages);

  let mut stages = config.stages.iter().collect::<Vec<_>>();
  stages.sort_by_key(|s| s.order);

  let mut matches = Vec::new();
  let mut byes = Vec::new();
  let mut errors = Vec::new();
  let mut warnings = Vec::new();
  for stage in &stages {
    let qualified = stage.qualifiers.and_then(|rule| {
      config
        .stage(rule.from_stage)
        .map(|source| qualifier_entrants(source, rule.per_group))
    });
    let generated = pairing::generate(stage, qualified.as_deref());
    debug!(
      stage_id = stage.id,
      format = ?stage.format,
      matches = generated.matches.len(),
      "stage generated"
    );
    for issue in generated.issues {
      warn!(stage_id = stage.id, message = %issue.message, "stage generation problem");
      push_issue(issue, &mut errors, &mut warnings);
    }
    matches.extend(generated.matches);
    byes.extend(generated.byes);
  }

  let outcome = allocator.allocate(&matches);
  errors.extend(outcome.errors);
  warnings.extend(outcome.warnings);
  info!(
    tournament_id = config.id,
    matches = outcome.matches.len(),
    byes = byes.len(),
    errors = errors.len(),
    warnings = warnings.len(),
    "schedule plan ready"
  );
  Ok(SchedulePlan {
    tournament_id: config.id,
    stage_ids: stages.iter().map(|s| s.id).collect(),
    matches: outcome.matches,
    byes,
    stats: outcome.stats,
    warnings,
    errors,
  })
}

/// Same plan as `generate_plan`; nothing is handed to a store.
pub fn preview(config: &TournamentConfig, settings: &EngineSettings) -> Result<SchedulePlan, ConfigError> {
  info!(tournament_id = config.id, "previewing schedule");
  generate_plan(config, settings)
}

/// Generates a plan and, when it carries no hard errors, replaces the stored
/// matches of every generated stage with it.
pub fn generate_and_commit<S: MatchStore>(
  store: &SharedMatchStore<S>,
  config: &TournamentConfig,
  settings: &EngineSettings,
) -> Result<SchedulePlan, String> {
  let plan = generate_plan(config, settings).map_err(|e| e.to_string())?;
  commit_plan(store, &plan)?;
  Ok(plan)
}

/// Brings a plan up to date with the resolver: known teams replace their
/// placeholders, dropped conditional matches disappear, and conditional
/// matches whose condition now holds are placed on the existing timeline.
/// Returns how many matches were newly scheduled.
pub fn sync_plan(
  plan: &mut SchedulePlan,
  advancement: &Advancement,
  config: &TournamentConfig,
  settings: &EngineSettings,
) -> Result<usize, String> {
  advancement.apply_to_plan(plan);
  let rest = config.rest.unwrap_or(settings.rest);
  let allocator = Allocator::new(&config.timing, rest, settings.look_ahead_minutes)
    .map_err(|e| e.to_string())?
    .with_stages(&config.stages);

  let waiting = plan
    .matches
    .iter()
    .filter(|m| matches!(m.allocation, Allocation::NotMaterialized(_)))
    .filter_map(|m| m.match_ref())
    .collect::<Vec<_>>();
  let mut placed = 0;
  for key in waiting {
    if let Some(materialized) = advancement.materialize(&key) {
      allocator.allocate_materialized(plan, &materialized)?;
      placed += 1;
    }
  }
  Ok(placed)
}

fn push_issue(issue: PlanIssue, errors: &mut Vec<PlanIssue>, warnings: &mut Vec<PlanIssue>) {
  if issue.kind.is_error() {
    errors.push(issue);
  } else {
    warnings.push(issue);
  }
}

/// Number of scheduled matches per stage, for operator summaries.
pub fn matches_per_stage(plan: &SchedulePlan) -> HashMap<StageId, usize> {
  let mut counts = HashMap::new();
  for (m, _) in plan.scheduled() {
    *counts.entry(m.stage_id).or_insert(0) += 1;
  }
  counts
}
