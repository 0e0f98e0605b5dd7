//! Property tests for the calendar, averages, ranking and ingest

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use rusty_stockrank::calendar::{is_weekend, BusinessCalendar, HolidaySet};
use rusty_stockrank::data::SeriesStore;
use rusty_stockrank::pipeline::{compute_all, IncreaseRates};
use rusty_stockrank::sink::{rank, SortKey, SortPass};
use rusty_stockrank::types::DailyBar;

fn day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset as i64)
}

fn holidays() -> impl Strategy<Value = HolidaySet> {
    prop::collection::vec(0u32..400, 0..40).prop_map(|offsets| {
        HolidaySet::from_dates(offsets.into_iter().map(day))
    })
}

proptest! {
    #[test]
    fn previous_business_day_is_closest_open_day(h in holidays(), offset in 30u32..380) {
        let now = day(offset);
        let Ok(previous) = h.previous_business_day(now) else {
            return Ok(());
        };

        prop_assert!(previous < now);
        prop_assert!(!is_weekend(previous));
        prop_assert!(!h.contains(previous));

        let mut between = previous + Duration::days(1);
        while between < now {
            prop_assert!(!h.is_business_day(between));
            between += Duration::days(1);
        }
    }

    #[test]
    fn previous_day_gate_matches_yesterday(h in holidays(), offset in 30u32..380) {
        let now = day(offset);
        let yesterday = now - Duration::days(1);
        prop_assert_eq!(h.is_previous_day_business_day(now), h.is_business_day(yesterday));
    }

    #[test]
    fn weekends_are_never_business_days(offset in 0u32..4000) {
        let date = day(offset);
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            prop_assert!(!HolidaySet::new().is_business_day(date));
        }
    }

    #[test]
    fn degraded_average_at_both_ends(
        closes in prop::collection::vec(1.0f64..1000.0, 1..40),
        window in 1usize..60,
    ) {
        let series: Vec<(NaiveDate, f64)> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| (day(1000 - i as u32), *c))
            .collect();
        let table = compute_all(&series, &[window]);
        let values = &table[&window];
        prop_assert_eq!(values.len(), series.len());

        let len = closes.len();
        let head = window.min(len);
        let expected_newest = closes[..head].iter().sum::<f64>() / head as f64;
        let newest = values[&series[0].0];
        prop_assert!((newest - expected_newest).abs() <= 1e-9 * expected_newest.abs().max(1.0));

        let oldest = values[&series[len - 1].0];
        prop_assert!((oldest - closes[len - 1]).abs() <= 1e-9 * oldest.abs().max(1.0));
    }

    #[test]
    fn rank_keeps_input_order_on_ties(keys in prop::collection::vec(0u8..4, 0..30)) {
        let items: Vec<IncreaseRates> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| IncreaseRates {
                instrument: format!("{:04}", i),
                rates: vec![Some(*k as f64)],
            })
            .collect();

        let ranked = rank(items, &[SortPass::descending(SortKey::IncreaseRate(0))]);
        for pair in ranked.windows(2) {
            let (a, b) = (pair[0].rates[0], pair[1].rates[0]);
            prop_assert!(a >= b);
            if a == b {
                prop_assert!(pair[0].instrument < pair[1].instrument);
            }
        }
    }

    #[test]
    fn overlapping_ingest_rejects_only_duplicates(first in 1u32..30, second in 1u32..30, shift in 0u32..30) {
        let bars = |from: u32, count: u32| -> Vec<DailyBar> {
            (from..from + count)
                .map(|d| DailyBar::new("8306", day(d), 1.0, 1.0, 1.0, 1.0, 1.0, 1.0))
                .collect()
        };

        let mut store = SeriesStore::new();
        let initial = store.ingest(bars(0, first));
        prop_assert_eq!(initial.merged(), first as usize);

        let report = store.ingest(bars(shift, second));
        let overlap = first.saturating_sub(shift).min(second) as usize;
        prop_assert_eq!(report.rejected_duplicates, overlap);
        prop_assert_eq!(report.merged(), second as usize - overlap);

        prop_assert_eq!(store.len(), (first + second) as usize - overlap);
    }
}
