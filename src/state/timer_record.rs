//! Timer record structure and remaining-time derivation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Step id → timer record, for one recipe
pub type StepTimers = BTreeMap<String, TimerRecord>;

/// Step identity handed over by the recipe UI when a timer is mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInfo {
    pub recipe_id: String,
    pub step_id: String,
    pub step_number: u32,
    pub instruction: String,
    pub duration_seconds: u64,
}

impl StepInfo {
    /// Rebuild step identity from a persisted record, for remounting after a restart
    pub fn from_record(record: &TimerRecord) -> Self {
        Self {
            recipe_id: record.recipe_id.clone(),
            step_id: record.step_id.clone(),
            step_number: record.step_number,
            instruction: record.instruction.clone(),
            duration_seconds: record.total_seconds,
        }
    }
}

/// Logical state of one step's countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Finished,
}

/// Persisted state of one step's countdown.
///
/// Field names follow the legacy on-disk layout. `runningSinceSeconds` holds
/// epoch milliseconds despite its name, as does `startedAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub step_id: String,
    pub recipe_id: String,
    pub step_number: u32,
    pub instruction: String,
    pub total_seconds: u64,
    pub started_at: i64,
    pub elapsed_seconds: u64,
    #[serde(rename = "runningSinceSeconds")]
    pub running_since_ms: Option<i64>,
}

impl TimerRecord {
    /// A freshly started record for `step`, running since `now_ms`
    pub fn started(step: &StepInfo, now_ms: i64) -> Self {
        Self {
            step_id: step.step_id.clone(),
            recipe_id: step.recipe_id.clone(),
            step_number: step.step_number,
            instruction: step.instruction.clone(),
            total_seconds: step.duration_seconds,
            started_at: now_ms,
            elapsed_seconds: 0,
            running_since_ms: Some(now_ms),
        }
    }

    /// Whole seconds consumed by the current running stretch
    pub fn running_seconds(&self, now_ms: i64) -> u64 {
        match self.running_since_ms {
            // A clock that moved backwards counts as no time passing.
            Some(since) => (now_ms.saturating_sub(since).max(0) / 1000) as u64,
            None => 0,
        }
    }

    /// `total − elapsed − running`, clamped at zero
    pub fn remaining_seconds(&self, now_ms: i64) -> u64 {
        let consumed = self
            .elapsed_seconds
            .saturating_add(self.running_seconds(now_ms));
        self.total_seconds.saturating_sub(consumed)
    }

    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    /// Phase as stored, without looking at the clock
    pub fn stored_phase(&self) -> TimerPhase {
        if self.is_running() {
            TimerPhase::Running
        } else if self.elapsed_seconds >= self.total_seconds {
            TimerPhase::Finished
        } else {
            TimerPhase::Paused
        }
    }

    /// Phase as observed at `now_ms`: a running record with nothing left is finished
    pub fn phase_at(&self, now_ms: i64) -> TimerPhase {
        match self.stored_phase() {
            TimerPhase::Running if self.remaining_seconds(now_ms) == 0 => TimerPhase::Finished,
            phase => phase,
        }
    }

    /// True when the record still needs its Running → Finished write
    pub fn needs_completion(&self, now_ms: i64) -> bool {
        self.is_running() && self.remaining_seconds(now_ms) == 0
    }

    /// Replacement record with the running stretch folded into `elapsed_seconds`
    pub fn paused(&self, now_ms: i64) -> Self {
        Self {
            elapsed_seconds: self
                .elapsed_seconds
                .saturating_add(self.running_seconds(now_ms))
                .min(self.total_seconds),
            running_since_ms: None,
            ..self.clone()
        }
    }

    /// Replacement record running again from `now_ms`
    pub fn resumed(&self, now_ms: i64) -> Self {
        Self {
            running_since_ms: Some(now_ms),
            ..self.clone()
        }
    }

    /// Replacement record in the terminal shape
    pub fn finished(&self) -> Self {
        Self {
            elapsed_seconds: self.total_seconds,
            running_since_ms: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(duration_seconds: u64) -> StepInfo {
        StepInfo {
            recipe_id: "risotto".to_string(),
            step_id: "s1".to_string(),
            step_number: 1,
            instruction: "Toast the rice".to_string(),
            duration_seconds,
        }
    }

    #[test]
    fn remaining_uses_wall_clock_delta() {
        let record = TimerRecord::started(&step(300), 10_000);
        assert_eq!(record.remaining_seconds(10_000), 300);
        assert_eq!(record.remaining_seconds(10_999), 300);
        assert_eq!(record.remaining_seconds(11_000), 299);
        assert_eq!(record.remaining_seconds(10_000 + 120_000), 180);
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let record = TimerRecord::started(&step(10), 0);
        assert_eq!(record.remaining_seconds(60_000), 0);
        assert!(record.needs_completion(60_000));
        assert_eq!(record.phase_at(60_000), TimerPhase::Finished);
        assert_eq!(record.stored_phase(), TimerPhase::Running);
    }

    #[test]
    fn backwards_clock_counts_as_no_time() {
        let record = TimerRecord::started(&step(30), 50_000);
        assert_eq!(record.remaining_seconds(20_000), 30);
    }

    #[test]
    fn pause_folds_running_time_into_elapsed() {
        let record = TimerRecord::started(&step(300), 0);
        let paused = record.paused(61_500);
        assert_eq!(paused.elapsed_seconds, 61);
        assert_eq!(paused.running_since_ms, None);
        assert_eq!(paused.stored_phase(), TimerPhase::Paused);
        assert_eq!(paused.remaining_seconds(999_999), 239);
    }

    #[test]
    fn pause_with_absurd_persisted_elapsed_does_not_overflow() {
        let mut record = TimerRecord::started(&step(300), 0);
        record.elapsed_seconds = u64::MAX - 5;

        let paused = record.paused(60_000);

        assert_eq!(paused.elapsed_seconds, 300);
        assert_eq!(paused.remaining_seconds(60_000), 0);
    }

    #[test]
    fn paused_in_first_second_is_still_paused() {
        let paused = TimerRecord::started(&step(300), 0).paused(400);
        assert_eq!(paused.elapsed_seconds, 0);
        assert_eq!(paused.stored_phase(), TimerPhase::Paused);
    }

    #[test]
    fn finished_shape_is_saturated() {
        let finished = TimerRecord::started(&step(90), 0).finished();
        assert_eq!(finished.elapsed_seconds, 90);
        assert_eq!(finished.running_since_ms, None);
        assert_eq!(finished.stored_phase(), TimerPhase::Finished);
        assert_eq!(finished.finished(), finished);
    }

    #[test]
    fn serializes_with_legacy_field_names() {
        let record = TimerRecord::started(&step(60), 1_700_000_000_000);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["stepId"], "s1");
        assert_eq!(json["recipeId"], "risotto");
        assert_eq!(json["totalSeconds"], 60);
        assert_eq!(json["startedAt"], 1_700_000_000_000_i64);
        assert_eq!(json["runningSinceSeconds"], 1_700_000_000_000_i64);

        let paused: TimerRecord = serde_json::from_value(serde_json::json!({
            "stepId": "s1",
            "recipeId": "risotto",
            "stepNumber": 1,
            "instruction": "Toast the rice",
            "totalSeconds": 60,
            "startedAt": 5,
            "elapsedSeconds": 12,
            "runningSinceSeconds": null
        }))
        .unwrap();
        assert_eq!(paused.running_since_ms, None);
        assert_eq!(paused.elapsed_seconds, 12);
    }
}
