use serde::{Deserialize, Serialize};

/// Divisor used for the MAPE mean.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MapeDenominator {
    /// Every valid pair, including those whose reference value is zero and therefore
    /// contribute nothing to the sum.
    #[default]
    AllPairs,
    /// Only the pairs that contributed to the sum.
    NonZeroReference,
}

/// Tunables for the statistics engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsConfig {
    pub mape_denominator: MapeDenominator,
}
