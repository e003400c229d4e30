use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelTier {
    pub rank: u32,
    pub name: &'static str,
    pub min_xp: i64,
}

/// Sorted ascending by `min_xp`, contiguous, starting at 0. A tier covers
/// `[min_xp, next.min_xp)`; the last one is open-ended.
pub static LEVEL_TIERS: &[LevelTier] = &[
    LevelTier {
        rank: 1,
        name: "체력 새싹",
        min_xp: 0,
    },
    LevelTier {
        rank: 2,
        name: "체력 새내기",
        min_xp: 200,
    },
    LevelTier {
        rank: 3,
        name: "체력 꿈나무",
        min_xp: 400,
    },
    LevelTier {
        rank: 4,
        name: "체력 유망주",
        min_xp: 600,
    },
    LevelTier {
        rank: 5,
        name: "체력 도전자",
        min_xp: 800,
    },
    LevelTier {
        rank: 6,
        name: "체력 탐험가",
        min_xp: 1000,
    },
    LevelTier {
        rank: 7,
        name: "체력 수호자",
        min_xp: 1200,
    },
    LevelTier {
        rank: 8,
        name: "체력 챔피언",
        min_xp: 1400,
    },
    LevelTier {
        rank: 9,
        name: "체력 영웅",
        min_xp: 1600,
    },
    LevelTier {
        rank: 10,
        name: "체력 전설",
        min_xp: 1800,
    },
];

/// Highest tier whose `min_xp <= xp`. Negative XP lands in the first tier.
pub fn level_of(xp: i64) -> &'static LevelTier {
    LEVEL_TIERS
        .iter()
        .rev()
        .find(|t| t.min_xp <= xp)
        .unwrap_or(&LEVEL_TIERS[0])
}

/// XP at which the next tier starts, `None` at the top tier.
pub fn next_threshold(xp: i64) -> Option<i64> {
    let current = level_of(xp);
    LEVEL_TIERS
        .iter()
        .find(|t| t.rank == current.rank + 1)
        .map(|t| t.min_xp)
}

/// (XP earned inside the current tier, width of the tier). The open-ended
/// top tier has no width.
pub fn progress_in_tier(xp: i64) -> (i64, Option<i64>) {
    let current = level_of(xp);
    let earned = (xp - current.min_xp).max(0);
    (earned, next_threshold(xp).map(|n| n - current.min_xp))
}
