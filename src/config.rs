use crate::types::*;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs,
    path::Path,
};

pub const MIN_REST_ENV: &str = "SCHEDULER_MIN_REST_MINUTES";
pub const PREFERRED_REST_ENV: &str = "SCHEDULER_PREFERRED_REST_MINUTES";
pub const LOOK_AHEAD_ENV: &str = "SCHEDULER_LOOK_AHEAD_MINUTES";

/// Engine-wide knobs. A tournament's own `rest` takes precedence over these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
  pub rest: RestConstraint,
  pub look_ahead_minutes: i64,
}

impl Default for EngineSettings {
  fn default() -> Self {
    EngineSettings {
      rest: RestConstraint::default(),
      look_ahead_minutes: DEFAULT_LOOK_AHEAD_MINUTES,
    }
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

fn parse_minutes(key: &str, raw: &str) -> Result<i64, String> {
  let minutes = raw
    .parse::<i64>()
    .map_err(|e| format!("{key}={raw} is not a number of minutes: {e}"))?;
  if minutes < 0 {
    return Err(format!("{key}={raw} cannot be negative"));
  }
  Ok(minutes)
}

/// Overrides settings from `lookup`, which maps a variable name to its value.
pub fn apply_overrides<F>(mut settings: EngineSettings, lookup: F) -> Result<EngineSettings, String>
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(raw) = lookup(MIN_REST_ENV) {
    settings.rest.minimum_minutes = parse_minutes(MIN_REST_ENV, &raw)?;
  }
  if let Some(raw) = lookup(PREFERRED_REST_ENV) {
    settings.rest.preferred_minutes = parse_minutes(PREFERRED_REST_ENV, &raw)?;
  }
  if let Some(raw) = lookup(LOOK_AHEAD_ENV) {
    settings.look_ahead_minutes = parse_minutes(LOOK_AHEAD_ENV, &raw)?;
  }
  if settings.rest.preferred_minutes < settings.rest.minimum_minutes {
    settings.rest.preferred_minutes = settings.rest.minimum_minutes;
  }
  Ok(settings)
}

pub fn apply_env_defaults(settings: EngineSettings) -> Result<EngineSettings, String> {
  apply_overrides(settings, env_default)
}

pub fn load_settings() -> Result<EngineSettings, String> {
  apply_env_defaults(EngineSettings::default())
}

/// Loads `KEY=value` lines into the process environment without overriding
/// variables that are already set. A missing file is not an error.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
  if !path.is_file() {
    return Ok(0);
  }
  let contents = fs::read_to_string(path).map_err(|e| format!("read env file {}: {e}", path.display()))?;
  let mut applied = 0;
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
        applied += 1;
      }
    }
  }
  Ok(applied)
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let value = raw_value.trim();
  let value = match (value.chars().next(), value.chars().last()) {
    (Some(open @ ('"' | '\'')), Some(close)) if open == close && value.len() >= 2 => &value[1..value.len() - 1],
    _ => value.split_once(" #").map(|(v, _)| v.trim_end()).unwrap_or(value),
  };
  Some((key.to_string(), value.to_string()))
}

pub fn load_tournament_config(path: &Path) -> Result<TournamentConfig, String> {
  let data = fs::read_to_string(path).map_err(|e| format!("read tournament config {}: {e}", path.display()))?;
  serde_json::from_str::<TournamentConfig>(&data)
    .map_err(|e| format!("parse tournament config {}: {e}", path.display()))
}

pub fn load_completed_matches(path: &Path) -> Result<Vec<CompletedMatch>, String> {
  let data = fs::read_to_string(path).map_err(|e| format!("read results {}: {e}", path.display()))?;
  serde_json::from_str::<Vec<CompletedMatch>>(&data).map_err(|e| format!("parse results {}: {e}", path.display()))
}

pub fn save_plan(path: &Path, plan: &SchedulePlan) -> Result<(), String> {
  let payload = serde_json::to_string_pretty(plan).map_err(|e| e.to_string())?;
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(|e| format!("create {}: {e}", parent.display()))?;
  }
  fs::write(path, payload).map_err(|e| format!("write plan {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect::<HashMap<_, _>>();
    move |key: &str| map.get(key).cloned()
  }

  #[test]
  fn defaults_match_documented_values() {
    let settings = apply_overrides(EngineSettings::default(), lookup(&[])).unwrap();
    assert_eq!(settings.rest.minimum_minutes, 15);
    assert_eq!(settings.rest.preferred_minutes, 30);
    assert_eq!(settings.look_ahead_minutes, 120);
  }

  #[test]
  fn overrides_replace_defaults() {
    let settings = apply_overrides(
      EngineSettings::default(),
      lookup(&[(MIN_REST_ENV, "20"), (LOOK_AHEAD_ENV, "45")]),
    )
    .unwrap();
    assert_eq!(settings.rest.minimum_minutes, 20);
    assert_eq!(settings.rest.preferred_minutes, 30);
    assert_eq!(settings.look_ahead_minutes, 45);

    let raised = apply_overrides(EngineSettings::default(), lookup(&[(MIN_REST_ENV, "40")])).unwrap();
    assert_eq!(raised.rest.preferred_minutes, 40);
  }

  #[test]
  fn bad_override_is_reported() {
    let err = apply_overrides(EngineSettings::default(), lookup(&[(PREFERRED_REST_ENV, "soon")])).unwrap_err();
    assert!(err.contains(PREFERRED_REST_ENV));
    assert!(apply_overrides(EngineSettings::default(), lookup(&[(MIN_REST_ENV, "-5")])).is_err());
  }

  #[test]
  fn env_lines_parse_like_shell_assignments() {
    assert_eq!(parse_env_line("# comment"), None);
    assert_eq!(parse_env_line(""), None);
    assert_eq!(parse_env_line("A=1"), Some(("A".to_string(), "1".to_string())));
    assert_eq!(
      parse_env_line("export NAME=\"Spring Cup\""),
      Some(("NAME".to_string(), "Spring Cup".to_string()))
    );
    assert_eq!(parse_env_line("REST=20 # minutes"), Some(("REST".to_string(), "20".to_string())));
    assert_eq!(parse_env_line("=oops"), None);
  }

  #[test]
  fn env_file_does_not_override_existing_variables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(
      &path,
      "PITCH_SCHEDULER_TEST_FRESH=from-file\nPITCH_SCHEDULER_TEST_SET=from-file\n",
    )
    .unwrap();
    env::set_var("PITCH_SCHEDULER_TEST_SET", "from-env");
    assert_eq!(load_env_file(&path), Ok(1));
    assert_eq!(env::var("PITCH_SCHEDULER_TEST_FRESH").unwrap(), "from-file");
    assert_eq!(env::var("PITCH_SCHEDULER_TEST_SET").unwrap(), "from-env");
    assert_eq!(load_env_file(&dir.path().join("missing.env")), Ok(0));
  }

  #[test]
  fn tournament_config_loads_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cup.json");
    fs::write(
      &path,
      r#"{
        "id": 3,
        "name": "Spring Cup",
        "timing": {
          "start": "2026-04-18T10:00:00Z",
          "matchDurationMinutes": 12,
          "transitionMinutes": 3,
          "pitches": [{ "id": 1, "name": "North" }]
        },
        "stages": [{
          "id": 1,
          "name": "Groups",
          "order": 1,
          "format": "groupStage",
          "groups": [{
            "id": 1,
            "name": "Group A",
            "order": 1,
            "teams": [{ "teamId": 1, "name": "Rovers" }, { "teamId": 2, "name": "United", "seed": 1 }]
          }]
        }],
        "rest": { "minimumMinutes": 10, "preferredMinutes": 20 }
      }"#,
    )
    .unwrap();
    let config = load_tournament_config(&path).unwrap();
    assert_eq!(config.stages[0].format, StageFormat::GroupStage);
    assert!(config.stages[0].grand_final_reset);
    assert_eq!(config.stages[0].groups[0].round_robin, RoundRobinKind::Single);
    assert_eq!(config.stages[0].groups[0].teams[1].seed, Some(1));
    assert_eq!(config.rest.map(|r| r.minimum_minutes), Some(10));

    let missing = load_tournament_config(&dir.path().join("nope.json")).unwrap_err();
    assert!(missing.starts_with("read tournament config"));
  }

  #[test]
  fn plan_saves_as_pretty_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("plan.json");
    let plan = SchedulePlan {
      tournament_id: 3,
      stage_ids: vec![1],
      matches: Vec::new(),
      byes: Vec::new(),
      stats: PlanStats::default(),
      warnings: Vec::new(),
      errors: Vec::new(),
    };
    save_plan(&path, &plan).unwrap();
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("\"tournamentId\": 3"));
  }
}
