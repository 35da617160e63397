use serde::{Deserialize, Serialize};

use super::event::{Score, TeamSide};

/// Who is ahead on the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leader {
    Home,
    Away,
    Tied,
}

impl Leader {
    pub fn of(score: Score) -> Leader {
        match score.home.cmp(&score.away) {
            std::cmp::Ordering::Greater => Self::Home,
            std::cmp::Ordering::Less => Self::Away,
            std::cmp::Ordering::Equal => Self::Tied,
        }
    }

    pub fn side(&self) -> Option<TeamSide> {
        match self {
            Self::Home => Some(TeamSide::Home),
            Self::Away => Some(TeamSide::Away),
            Self::Tied => None,
        }
    }
}

/// Sorted ascending margin thresholds that turn a raw margin into a tier.
///
/// Tier 0 is below the first threshold; tier k means the margin is at
/// least `thresholds[k - 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadLadder {
    pub thresholds: Vec<u32>,
}

impl Default for LeadLadder {
    fn default() -> Self {
        Self {
            thresholds: vec![3, 6, 10, 16],
        }
    }
}

impl LeadLadder {
    pub fn new(thresholds: Vec<u32>) -> Self {
        Self { thresholds }
    }

    pub fn is_sorted(&self) -> bool {
        self.thresholds.windows(2).all(|w| w[0] < w[1])
    }

    pub fn tier_for(&self, margin: u32) -> u8 {
        self.thresholds.iter().take_while(|t| margin >= **t).count() as u8
    }

    pub fn state_for(&self, score: Score) -> LeadState {
        let margin = score.margin();
        LeadState {
            leader: Leader::of(score),
            margin,
            tier: self.tier_for(margin),
        }
    }
}

/// Derived lead situation after one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadState {
    pub leader: Leader,
    pub margin: u32,
    pub tier: u8,
}

impl LeadState {
    /// Same leader and same tier; margin movement inside a tier is not a
    /// state change.
    pub fn same_bucket(&self, other: &LeadState) -> bool {
        self.leader == other.leader && self.tier == other.tier
    }
}
