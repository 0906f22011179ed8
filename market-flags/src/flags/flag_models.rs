use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Share of traffic routed to the new and the current implementation for a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SplitPercentage {
    pub new: i64,
    pub current: i64,
}

impl SplitPercentage {
    pub fn is_valid(&self) -> bool {
        self.new >= 0 && self.current >= 0 && self.new.checked_add(self.current) == Some(100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub market: String,
    #[serde(default)]
    pub new_feature_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_split_percentage: Option<SplitPercentage>,
}

/// Every market's flags, in the order they appear in the stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagSet {
    #[serde(rename = "featureFlags", default)]
    pub flags: Vec<FeatureFlag>,
}

impl FlagSet {
    pub fn new(flags: Vec<FeatureFlag>) -> Self {
        Self { flags }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeatureFlag> {
        self.flags.get(index)
    }

    /// Moves the flag at `index` out of the set.
    pub fn into_flag(mut self, index: usize) -> Option<FeatureFlag> {
        if index < self.flags.len() {
            Some(self.flags.swap_remove(index))
        } else {
            None
        }
    }

    /// Markets that appear more than once, each reported once in first-seen order.
    pub fn duplicate_markets(&self) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.flags.len());
        let mut reported: HashSet<&str> = HashSet::new();
        let mut duplicates = Vec::new();
        for flag in &self.flags {
            let market = flag.market.as_str();
            if !seen.insert(market) && reported.insert(market) {
                duplicates.push(market);
            }
        }
        duplicates
    }

    pub fn first_invalid_split(&self) -> Option<(&FeatureFlag, SplitPercentage)> {
        self.flags.iter().find_map(|flag| match flag.ab_split_percentage {
            Some(split) if !split.is_valid() => Some((flag, split)),
            _ => None,
        })
    }
}
