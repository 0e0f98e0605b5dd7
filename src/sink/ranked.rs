//! Report ordering and batched hand-off to the retrying writer

use crate::pipeline::{DailySignal, IncreaseRates, NO_CROSSING_SENTINEL};
use crate::sink::retry::{RetryingBatchWriter, WriteOutcome};
use crate::sink::{BatchSink, Row, ToRow};

/// Value a report can be sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Crossing rate, sentinel when not crossed
    CrossingRate,
    /// Trend pattern rank
    TrendRank,
    /// Increase rate at the given lag index (0 = against the previous price)
    IncreaseRate(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One stable sort pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPass {
    pub key: SortKey,
    pub direction: Direction,
}

impl SortPass {
    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            direction: Direction::Descending,
        }
    }

    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            direction: Direction::Ascending,
        }
    }
}

/// Something that can be placed in a ranked report
pub trait Rankable {
    /// Value for `key`; `None` when undefined or not applicable
    fn sort_value(&self, key: SortKey) -> Option<f64>;
}

impl Rankable for DailySignal {
    fn sort_value(&self, key: SortKey) -> Option<f64> {
        match key {
            SortKey::CrossingRate => self.crossing.increasing_rate,
            SortKey::TrendRank => Some(self.snapshot.classification.rank() as f64),
            SortKey::IncreaseRate(lag) => self.rates.rates.get(lag).copied().flatten(),
        }
    }
}

impl Rankable for IncreaseRates {
    fn sort_value(&self, key: SortKey) -> Option<f64> {
        match key {
            SortKey::IncreaseRate(lag) => self.rates.get(lag).copied().flatten(),
            SortKey::CrossingRate | SortKey::TrendRank => None,
        }
    }
}

/// Apply stable sort passes in order.
///
/// Each pass keeps the order left by earlier passes among its ties, so the
/// last pass is the primary key. Undefined values sort as the `0.0` sentinel.
pub fn rank<T: Rankable>(mut items: Vec<T>, passes: &[SortPass]) -> Vec<T> {
    for pass in passes {
        items.sort_by(|a, b| {
            let a = a.sort_value(pass.key).unwrap_or(NO_CROSSING_SENTINEL);
            let b = b.sort_value(pass.key).unwrap_or(NO_CROSSING_SENTINEL);
            match pass.direction {
                Direction::Ascending => a.total_cmp(&b),
                Direction::Descending => b.total_cmp(&a),
            }
        });
    }
    items
}

/// Ranks records and writes them batch by batch
#[derive(Debug, Clone)]
pub struct RankedWriter {
    writer: RetryingBatchWriter,
    batch_size: usize,
    passes: Vec<SortPass>,
}

impl RankedWriter {
    pub fn new(writer: RetryingBatchWriter, batch_size: usize, passes: Vec<SortPass>) -> Self {
        Self {
            writer,
            batch_size: batch_size.max(1),
            passes,
        }
    }

    /// Daily report order: crossing rate, then trend rank as the primary key
    pub fn daily_passes() -> Vec<SortPass> {
        vec![
            SortPass::descending(SortKey::CrossingRate),
            SortPass::descending(SortKey::TrendRank),
        ]
    }

    /// Intraday report order: latest increase rate
    pub fn intraday_passes() -> Vec<SortPass> {
        vec![SortPass::descending(SortKey::IncreaseRate(0))]
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn rank<T: Rankable>(&self, items: Vec<T>) -> Vec<T> {
        rank(items, &self.passes)
    }

    /// Rank, flatten and write `items`; returns the ranked rows' outcome
    pub fn write<T, B>(&self, sink: &mut B, items: Vec<T>) -> WriteOutcome
    where
        T: Rankable + ToRow,
        B: BatchSink + ?Sized,
    {
        let rows: Vec<Row> = self.rank(items).iter().map(ToRow::to_row).collect();
        self.writer.write_batches(sink, &rows, self.batch_size)
    }

    /// Write rows in their given order, batch by batch
    pub fn write_rows<B: BatchSink + ?Sized>(&self, sink: &mut B, rows: &[Row]) -> WriteOutcome {
        self.writer.write_batches(sink, rows, self.batch_size)
    }
}
