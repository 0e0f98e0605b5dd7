//! Indicator pipeline: moving averages, trend labels, crossings, increase rates

pub mod classifiers;
pub mod crossing;
pub mod increase_rate;
pub mod moving_average;
pub mod signal;

pub use classifiers::{
    is_non_increasing, is_strictly_decreasing, TrendClassifier, TrendPattern, TrendSnapshot,
};
pub use crossing::{CrossingDetector, CrossingSignal, NO_CROSSING_SENTINEL};
pub use increase_rate::IncreaseRates;
pub use moving_average::{
    compute_all, degraded_mean, MovingAverageEngine, MovingAverageRecord, MovingAverageTable,
};
pub use signal::{DailySignal, Evaluation, SignalPipeline};
