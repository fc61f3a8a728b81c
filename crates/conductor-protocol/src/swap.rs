//! Swap modes and plans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Continuity tier actually achievable between two modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapTier {
    Cold,
    Warm,
    Hot,
}

impl SwapTier {
    /// Next tier down, `None` below cold.
    pub fn step_down(self) -> Option<Self> {
        match self {
            Self::Hot => Some(Self::Warm),
            Self::Warm => Some(Self::Cold),
            Self::Cold => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for SwapTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier requested by the caller. `Auto` picks the best mutual tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapMode {
    #[default]
    Auto,
    Hot,
    Warm,
    Cold,
}

impl SwapMode {
    pub fn tier(self) -> Option<SwapTier> {
        match self {
            Self::Auto => None,
            Self::Hot => Some(SwapTier::Hot),
            Self::Warm => Some(SwapTier::Warm),
            Self::Cold => Some(SwapTier::Cold),
        }
    }
}

impl fmt::Display for SwapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier() {
            Some(tier) => tier.fmt(f),
            None => f.write_str("auto"),
        }
    }
}

impl std::str::FromStr for SwapMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Self::Auto),
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            other => Err(format!("unknown swap mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlan {
    pub requested: SwapMode,
    pub resolved: SwapTier,
    pub reasons: Vec<String>,
    pub fallback_used: bool,
}
