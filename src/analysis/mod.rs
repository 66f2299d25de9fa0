pub mod benchmark;
pub mod chart;
pub mod compare;
pub mod config;
pub mod stats;

pub use benchmark::{
    benchmark_session, can_compare_with_benchmark, resolve_comparison, ComparisonTarget,
    Resolution, Unavailable, BENCHMARK_SESSION_ID,
};
pub use chart::{project_chart, session_label, ChartPoint, ChartProjection};
pub use compare::{compare, default_selection, resolve_pair, ComparisonOutcome, ComparisonReport};
pub use config::{MapeDenominator, StatsConfig};
pub use stats::{compute_joint_stats, compute_stats, JointStats, Stats};
