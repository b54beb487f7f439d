use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::types::{AllocatedMatch, SchedulePlan, StageId};

// ── Persistence seam ───────────────────────────────────────────────────

/// Where committed matches live. The engine never writes anywhere else.
pub trait MatchStore {
    fn replace_stage_matches(&mut self, stage_id: StageId, matches: Vec<AllocatedMatch>) -> Result<(), String>;
    /// Removes every match of the given stages and returns how many went.
    fn clear_stages(&mut self, stage_ids: &[StageId]) -> Result<usize, String>;
    fn stage_matches(&self, stage_id: StageId) -> Vec<AllocatedMatch>;
}

#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    stages: BTreeMap<StageId, Vec<AllocatedMatch>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_matches(&self) -> usize {
        self.stages.values().map(|m| m.len()).sum()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn replace_stage_matches(&mut self, stage_id: StageId, matches: Vec<AllocatedMatch>) -> Result<(), String> {
        if matches.iter().any(|m| m.stage_id != stage_id) {
            return Err(format!("Refusing to store matches of another stage under stage {stage_id}."));
        }
        self.stages.insert(stage_id, matches);
        Ok(())
    }

    fn clear_stages(&mut self, stage_ids: &[StageId]) -> Result<usize, String> {
        let mut removed = 0;
        for stage_id in stage_ids {
            if let Some(matches) = self.stages.remove(stage_id) {
                removed += matches.len();
            }
        }
        Ok(removed)
    }

    fn stage_matches(&self, stage_id: StageId) -> Vec<AllocatedMatch> {
        self.stages.get(&stage_id).cloned().unwrap_or_default()
    }
}

/// Holding the lock serializes regeneration of one tournament.
pub type SharedMatchStore<S = InMemoryMatchStore> = Arc<Mutex<S>>;

// ── Operations ─────────────────────────────────────────────────────────

/// Replaces the stored matches of every stage in the plan. Plans with hard
/// errors are refused. Returns the number of matches written.
pub fn commit_plan<S: MatchStore>(store: &SharedMatchStore<S>, plan: &SchedulePlan) -> Result<usize, String> {
    if !plan.is_successful() {
        return Err(format!(
            "Plan for tournament {} has {} error(s) and was not saved.",
            plan.tournament_id,
            plan.errors.len()
        ));
    }
    let mut by_stage: BTreeMap<StageId, Vec<AllocatedMatch>> =
        plan.stage_ids.iter().map(|id| (*id, Vec::new())).collect();
    for m in &plan.matches {
        by_stage.entry(m.stage_id).or_default().push(m.clone());
    }

    let mut guard = store.lock().map_err(|e| e.to_string())?;
    let mut written = 0;
    for (stage_id, matches) in by_stage {
        written += matches.len();
        guard.replace_stage_matches(stage_id, matches)?;
    }
    info!(tournament_id = plan.tournament_id, written, "committed schedule plan");
    Ok(written)
}

pub fn clear_tournament<S: MatchStore>(store: &SharedMatchStore<S>, stage_ids: &[StageId]) -> Result<usize, String> {
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    let removed = guard.clear_stages(stage_ids)?;
    info!(stages = stage_ids.len(), removed, "cleared stored matches");
    Ok(removed)
}
