use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    pub current: u32,
    pub best: u32,
    pub active_days: u32,
}

/// Consecutive active days ending at the latest active day, provided that
/// day is today or yesterday; otherwise 0. Days after `today` are ignored.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(&latest) = days.range(..=today).next_back() else {
        return 0;
    };
    if (today - latest).num_days() > 1 {
        return 0;
    }
    let mut streak = 0u32;
    let mut expected = latest;
    for &day in days.range(..=latest).rev() {
        if day != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    streak
}

pub fn best_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if (day - p).num_days() == 1 => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

pub fn stats(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> StreakStats {
    StreakStats {
        current: current_streak(days, today),
        best: best_streak(days),
        active_days: days.len() as u32,
    }
}
