//! Price History Store
//!
//! Bounded, append-only tick series per asset, shared between the streaming
//! clients (writers) and the read API (readers).
//!
//! # Design
//!
//! - One `RwLock` guards the map of series. Contention is low (one writer per
//!   asset, occasional readers), so a global region is sufficient.
//! - No I/O ever happens while the lock is held. Seeding fetches before taking
//!   the lock and re-checks emptiness once it holds it.
//! - Eviction is FIFO: the oldest tick leaves first and the relative order of
//!   the survivors is preserved.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::tick::{AssetId, Tick};

/// Default bound on series length.
pub const DEFAULT_MAX_HISTORY_POINTS: usize = 1800;

// =============================================================================
// Series Summary
// =============================================================================

/// Aggregate view over one snapshot of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Number of ticks in the series.
    pub count: usize,
    /// Oldest retained price.
    pub first: f64,
    /// Most recent price.
    pub last: f64,
    /// Highest retained price.
    pub high: f64,
    /// Lowest retained price.
    pub low: f64,
    /// Absolute change from the oldest to the most recent price.
    pub change: f64,
    /// Change relative to the oldest price, in percent.
    pub change_pct: f64,
    /// Change from the previous tick to the most recent one. Zero for a single tick.
    pub last_change: f64,
    /// `last_change` relative to the previous price, in percent.
    pub last_change_pct: f64,
}

impl SeriesSummary {
    /// Summarize a snapshot. Returns `None` for an empty slice.
    #[must_use]
    pub fn from_ticks(ticks: &[Tick]) -> Option<Self> {
        let first = ticks.first()?.price();
        let last = ticks.last()?.price();

        let (high, low) = ticks.iter().fold((f64::MIN, f64::MAX), |(hi, lo), t| {
            (hi.max(t.price()), lo.min(t.price()))
        });

        let change = last - first;
        let previous = ticks.iter().rev().nth(1).map_or(last, Tick::price);
        let last_change = last - previous;

        Some(Self {
            count: ticks.len(),
            first,
            last,
            high,
            low,
            change,
            change_pct: change / first * 100.0,
            last_change,
            last_change_pct: last_change / previous * 100.0,
        })
    }
}

// =============================================================================
// Price History Store
// =============================================================================

/// Thread-safe bounded tick history keyed by asset.
///
/// Construct once per process and share it behind an `Arc`.
pub struct PriceHistoryStore {
    max_history_points: usize,
    series: RwLock<HashMap<AssetId, VecDeque<Tick>>>,
}

impl PriceHistoryStore {
    /// Create a store bounding every series at `max_history_points`.
    ///
    /// A bound of zero is raised to one.
    #[must_use]
    pub fn new(max_history_points: usize) -> Self {
        Self {
            max_history_points: max_history_points.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Maximum number of ticks retained per asset.
    #[must_use]
    pub const fn max_history_points(&self) -> usize {
        self.max_history_points
    }

    /// Append a tick, evicting the oldest entries if the bound is exceeded.
    ///
    /// Ticks that violate the price invariant are dropped and `false` is
    /// returned. The push and the trim happen under one write lock, so no
    /// reader can observe an intermediate state.
    pub fn append(&self, asset: &AssetId, tick: Tick) -> bool {
        if !tick.is_valid() {
            tracing::debug!(asset = %asset, price = tick.price(), "Dropping invalid tick");
            return false;
        }

        let mut series = self.series.write();
        let entries = series
            .entry(asset.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_history_points.min(1024)));

        entries.push_back(tick);
        while entries.len() > self.max_history_points {
            entries.pop_front();
        }

        true
    }

    /// Append a price observed now.
    ///
    /// Returns `false` if the price is not finite or not positive.
    pub fn append_price(&self, asset: &AssetId, price: f64) -> bool {
        Tick::now(price).is_ok_and(|tick| self.append(asset, tick))
    }

    /// Copy of the asset's series at call time, oldest first.
    ///
    /// Unknown assets yield an empty vector.
    #[must_use]
    pub fn snapshot(&self, asset: &AssetId) -> Vec<Tick> {
        self.series
            .read()
            .get(asset)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ticks stamped strictly after `cutoff`, oldest first.
    ///
    /// Series are appended in arrival order, so the scan starts from the
    /// newest tick and stops at the first one at or before the cutoff.
    #[must_use]
    pub fn snapshot_since(&self, asset: &AssetId, cutoff: DateTime<Utc>) -> Vec<Tick> {
        let series = self.series.read();
        let Some(entries) = series.get(asset) else {
            return Vec::new();
        };

        let kept = entries
            .iter()
            .rev()
            .take_while(|tick| tick.timestamp() > cutoff)
            .count();
        entries.iter().skip(entries.len() - kept).copied().collect()
    }

    /// Most recent tick for the asset, if any.
    #[must_use]
    pub fn latest(&self, asset: &AssetId) -> Option<Tick> {
        self.series.read().get(asset).and_then(VecDeque::back).copied()
    }

    /// Most recent price for the asset, if any.
    #[must_use]
    pub fn current_price(&self, asset: &AssetId) -> Option<f64> {
        self.latest(asset).as_ref().map(Tick::price)
    }

    /// Number of ticks currently held for the asset.
    #[must_use]
    pub fn len(&self, asset: &AssetId) -> usize {
        self.series.read().get(asset).map_or(0, VecDeque::len)
    }

    /// Whether the asset has no ticks.
    #[must_use]
    pub fn is_empty(&self, asset: &AssetId) -> bool {
        self.len(asset) == 0
    }

    /// Assets that have a series, sorted.
    #[must_use]
    pub fn assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.series.read().keys().cloned().collect();
        assets.sort();
        assets
    }

    /// Summary statistics over a fresh snapshot.
    #[must_use]
    pub fn summary(&self, asset: &AssetId) -> Option<SeriesSummary> {
        SeriesSummary::from_ticks(&self.snapshot(asset))
    }

    /// Seed an empty series with a single fetched price.
    ///
    /// `fetch` runs outside any lock. The tick is stored only if the series
    /// is still empty once the result is in, so a stream that delivered data
    /// in the meantime wins. Failures are logged and reported as `false`.
    pub async fn seed_if_empty<F, Fut, E>(&self, asset: &AssetId, fetch: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<f64, E>>,
        E: fmt::Display,
    {
        if !self.is_empty(asset) {
            tracing::debug!(asset = %asset, "Series already populated, skipping seed");
            return false;
        }

        let price = match fetch().await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Could not seed price");
                return false;
            }
        };

        let tick = match Tick::now(price) {
            Ok(tick) => tick,
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Seed returned an invalid price");
                return false;
            }
        };

        let seeded = self.append_if_empty(asset, tick);
        if seeded {
            tracing::info!(asset = %asset, price, "Seeded price history");
        } else {
            tracing::debug!(asset = %asset, "Series populated while seeding, discarding seed");
        }
        seeded
    }

    fn append_if_empty(&self, asset: &AssetId, tick: Tick) -> bool {
        let mut series = self.series.write();
        let entries = series.entry(asset.clone()).or_default();
        if !entries.is_empty() {
            return false;
        }
        entries.push_back(tick);
        true
    }
}

impl Default for PriceHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_POINTS)
    }
}

impl fmt::Debug for PriceHistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceHistoryStore")
            .field("max_history_points", &self.max_history_points)
            .field("assets", &self.series.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;

    fn btc() -> AssetId {
        AssetId::new("bitcoin").unwrap()
    }

    fn prices(ticks: &[Tick]) -> Vec<f64> {
        ticks.iter().map(Tick::price).collect()
    }

    #[test]
    fn bound_three_keeps_latest_three() {
        let store = PriceHistoryStore::new(3);
        for price in [10.0, 20.0, 30.0, 40.0] {
            assert!(store.append_price(&btc(), price));
        }
        assert_eq!(prices(&store.snapshot(&btc())), vec![20.0, 30.0, 40.0]);
    }

    #[test]
    fn non_positive_prices_never_change_length() {
        let store = PriceHistoryStore::new(10);
        store.append_price(&btc(), 5.0);

        assert!(!store.append_price(&btc(), 0.0));
        assert!(!store.append_price(&btc(), -3.0));
        assert!(!store.append_price(&btc(), f64::NAN));

        assert_eq!(store.len(&btc()), 1);
    }

    #[test]
    fn deserialized_invalid_tick_is_dropped() {
        let store = PriceHistoryStore::new(10);
        let tick: Tick =
            serde_json::from_str(r#"{"timestamp":"2024-01-01T00:00:00Z","price":-2.0}"#).unwrap();
        assert!(!store.append(&btc(), tick));
        assert!(store.is_empty(&btc()));
    }

    #[test]
    fn unknown_asset_reads_are_empty() {
        let store = PriceHistoryStore::default();
        assert!(store.snapshot(&btc()).is_empty());
        assert_eq!(store.current_price(&btc()), None);
        assert!(store.summary(&btc()).is_none());
        assert!(store.assets().is_empty());
    }

    #[test]
    fn current_price_is_latest_append() {
        let store = PriceHistoryStore::new(5);
        store.append_price(&btc(), 1.0);
        store.append_price(&btc(), 2.5);
        assert_eq!(store.current_price(&btc()), Some(2.5));
    }

    #[test]
    fn series_are_independent_per_asset() {
        let store = PriceHistoryStore::new(2);
        let eth = AssetId::new("ethereum").unwrap();
        store.append_price(&btc(), 1.0);
        store.append_price(&eth, 2.0);
        store.append_price(&eth, 3.0);
        store.append_price(&eth, 4.0);

        assert_eq!(prices(&store.snapshot(&btc())), vec![1.0]);
        assert_eq!(prices(&store.snapshot(&eth)), vec![3.0, 4.0]);
        assert_eq!(store.assets(), vec![btc(), eth]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_appends() {
        let store = PriceHistoryStore::new(5);
        store.append_price(&btc(), 1.0);
        let snap = store.snapshot(&btc());
        store.append_price(&btc(), 2.0);
        assert_eq!(prices(&snap), vec![1.0]);
    }

    #[test]
    fn zero_bound_is_raised_to_one() {
        let store = PriceHistoryStore::new(0);
        store.append_price(&btc(), 1.0);
        store.append_price(&btc(), 2.0);
        assert_eq!(store.max_history_points(), 1);
        assert_eq!(prices(&store.snapshot(&btc())), vec![2.0]);
    }

    #[test]
    fn summary_tracks_extremes_and_change() {
        let store = PriceHistoryStore::new(10);
        for price in [100.0, 120.0, 90.0, 110.0] {
            store.append_price(&btc(), price);
        }
        let summary = store.summary(&btc()).unwrap();
        assert_eq!(summary.count, 4);
        assert!((summary.high - 120.0).abs() < f64::EPSILON);
        assert!((summary.low - 90.0).abs() < f64::EPSILON);
        assert!((summary.change - 10.0).abs() < f64::EPSILON);
        assert!((summary.change_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn summary_reports_last_tick_change() {
        let store = PriceHistoryStore::new(10);
        for price in [100.0, 120.0, 90.0] {
            store.append_price(&btc(), price);
        }
        let summary = store.summary(&btc()).unwrap();
        assert!((summary.last_change + 30.0).abs() < f64::EPSILON);
        assert!((summary.last_change_pct + 25.0).abs() < 1e-9);
    }

    #[test]
    fn single_tick_has_no_last_change() {
        let store = PriceHistoryStore::new(10);
        store.append_price(&btc(), 50.0);
        let summary = store.summary(&btc()).unwrap();
        assert!(summary.last_change.abs() < f64::EPSILON);
        assert!(summary.last_change_pct.abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_since_keeps_ticks_after_cutoff() {
        let store = PriceHistoryStore::new(10);
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        for (minutes, price) in [(0, 1.0), (5, 2.0), (10, 3.0), (15, 4.0)] {
            let tick = Tick::new(base + chrono::Duration::minutes(minutes), price).unwrap();
            store.append(&btc(), tick);
        }

        let cutoff = base + chrono::Duration::minutes(5);
        assert_eq!(prices(&store.snapshot_since(&btc(), cutoff)), vec![3.0, 4.0]);
        assert_eq!(
            prices(&store.snapshot_since(&btc(), base - chrono::Duration::minutes(1))),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        assert!(
            store
                .snapshot_since(&btc(), base + chrono::Duration::hours(1))
                .is_empty()
        );
        assert!(store.snapshot_since(&AssetId::new("eth").unwrap(), base).is_empty());
    }

    #[test]
    fn latest_returns_last_tick() {
        let store = PriceHistoryStore::new(5);
        assert!(store.latest(&btc()).is_none());
        store.append_price(&btc(), 3.0);
        store.append_price(&btc(), 4.0);
        assert!((store.latest(&btc()).unwrap().price() - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn seed_stores_single_tick_when_empty() {
        let store = PriceHistoryStore::new(10);
        let seeded = store
            .seed_if_empty(&btc(), || async { Ok::<_, String>(42_000.0) })
            .await;
        assert!(seeded);
        assert_eq!(prices(&store.snapshot(&btc())), vec![42_000.0]);
    }

    #[tokio::test]
    async fn seed_skips_fetch_when_populated() {
        let store = PriceHistoryStore::new(10);
        store.append_price(&btc(), 7.0);
        let calls = AtomicUsize::new(0);

        let seeded = store
            .seed_if_empty(&btc(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1.0)
            })
            .await;

        assert!(!seeded);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(prices(&store.snapshot(&btc())), vec![7.0]);
    }

    #[tokio::test]
    async fn seed_failure_leaves_series_empty() {
        let store = PriceHistoryStore::new(10);
        let seeded = store
            .seed_if_empty(&btc(), || async { Err::<f64, _>("timeout".to_string()) })
            .await;
        assert!(!seeded);
        assert!(store.is_empty(&btc()));
    }

    #[tokio::test]
    async fn seed_with_invalid_price_is_rejected() {
        let store = PriceHistoryStore::new(10);
        let seeded = store
            .seed_if_empty(&btc(), || async { Ok::<_, String>(0.0) })
            .await;
        assert!(!seeded);
        assert!(store.is_empty(&btc()));
    }

    #[tokio::test]
    async fn seed_discarded_if_stream_populates_first() {
        let store = PriceHistoryStore::new(10);
        let seeded = store
            .seed_if_empty(&btc(), || async {
                store.append_price(&btc(), 99.0);
                Ok::<_, String>(1.0)
            })
            .await;
        assert!(!seeded);
        assert_eq!(prices(&store.snapshot(&btc())), vec![99.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_seeds_store_at_most_one_tick() {
        let store = Arc::new(PriceHistoryStore::new(10));
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut handles = Vec::new();
        for price in [1.0, 2.0] {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                store
                    .seed_if_empty(&btc(), || async move {
                        // Both seeders pass the emptiness check before either appends.
                        barrier.wait().await;
                        Ok::<_, String>(price)
                    })
                    .await
            }));
        }

        let mut seeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                seeded += 1;
            }
        }

        assert_eq!(seeded, 1);
        assert_eq!(store.len(&btc()), 1);
    }

    #[test]
    fn concurrent_readers_never_see_shrinking_series() {
        const BOUND: usize = 50;
        const WRITES: usize = 5_000;

        let store = Arc::new(PriceHistoryStore::new(BOUND));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..WRITES {
                    #[allow(clippy::cast_precision_loss)]
                    let price = (i + 1) as f64;
                    store.append_price(&btc(), price);
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut last_len = 0;
                let mut last_price = 0.0;
                for _ in 0..WRITES {
                    let snap = store.snapshot(&btc());
                    assert!(snap.len() <= BOUND);
                    assert!(snap.len() >= last_len, "series shrank below previous length");
                    assert!(snap.windows(2).all(|w| w[0].price() < w[1].price()));
                    if let Some(tick) = snap.last() {
                        assert!(tick.price() >= last_price);
                        last_price = tick.price();
                    }
                    last_len = snap.len();
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.len(&btc()), BOUND);
    }

    proptest! {
        #[test]
        fn bound_holds_after_every_append(
            bound in 1usize..20,
            values in prop::collection::vec(0.01f64..1e6, 0..100),
        ) {
            let store = PriceHistoryStore::new(bound);
            for value in &values {
                store.append_price(&btc(), *value);
                prop_assert!(store.len(&btc()) <= bound);
            }
        }

        #[test]
        fn eviction_is_fifo(
            bound in 1usize..20,
            values in prop::collection::vec(0.01f64..1e6, 0..100),
        ) {
            let store = PriceHistoryStore::new(bound);
            for value in &values {
                store.append_price(&btc(), *value);
            }
            let expected: Vec<f64> = values
                .iter()
                .skip(values.len().saturating_sub(bound))
                .copied()
                .collect();
            prop_assert_eq!(prices(&store.snapshot(&btc())), expected);
        }
    }
}
