use crate::engine::activity::ActivityRecord;
use crate::engine::catalog::{Exercise, Metric};
use crate::engine::goals::DayGoals;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseProgress {
    pub metric: Metric,
    pub achieved: i64,
    pub target: i64,
    pub met: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub progress: BTreeMap<String, ExerciseProgress>,
    pub met: BTreeSet<String>,
}

/// Computes today's per-exercise totals and the set of met goals.
///
/// Always evaluates the whole day from scratch: a later record can satisfy
/// a goal an earlier pass missed, and goal edits change what counts.
pub fn evaluate(
    goals: &DayGoals,
    records: &[ActivityRecord],
    catalog: &[Exercise],
    today: NaiveDate,
) -> Evaluation {
    let mut out = Evaluation::default();
    for exercise in catalog {
        if goals.skipped.contains(&exercise.id) {
            continue;
        }
        let Some(target) = goals.targets.get(&exercise.id) else {
            continue;
        };
        let metric = target.metric();
        if !exercise.declares(metric) {
            continue;
        }
        let achieved: i64 = records
            .iter()
            .filter(|r| r.exercise_id == exercise.id && r.logged_on == today)
            .map(|r| r.quantity(metric))
            .fold(0, i64::saturating_add);
        let goal = target.amount();
        let met = goal > 0 && achieved >= goal;
        if met {
            out.met.insert(exercise.id.clone());
        }
        out.progress.insert(
            exercise.id.clone(),
            ExerciseProgress {
                metric,
                achieved,
                target: goal,
                met,
            },
        );
    }
    out
}
