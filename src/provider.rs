//! Market data provider contract and an in-memory series cache
//!
//! The crate ships no network client. Applications implement
//! [`MarketDataProvider`] over their data source and put a [`SeriesCache`] in
//! front of it so repeated requests for the same window are served from memory.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::debug;

use crate::series::{Series, TimeFrame};
use crate::{AnalysisError, Result};

/// A request for one instrument's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub timeframe: TimeFrame,
    /// Data source name, part of the cache key
    pub source: String,
    /// Fail with `InsufficientData` when fewer bars come back
    pub min_bars: Option<usize>,
}

impl SeriesRequest {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            end,
            timeframe: TimeFrame::Daily,
            source: "default".to_string(),
            min_bars: None,
        }
    }

    pub fn timeframe(mut self, timeframe: TimeFrame) -> Self {
        self.timeframe = timeframe;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn min_bars(mut self, min_bars: usize) -> Self {
        self.min_bars = Some(min_bars);
        self
    }

    /// Same window and source for another ticker (used for the benchmark)
    pub fn for_ticker(&self, ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            min_bars: None,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("ticker must not be empty".into()));
        }
        if self.start > self.end {
            return Err(AnalysisError::InvalidConfig(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            ticker: self.ticker.to_uppercase(),
            start: self.start,
            end: self.end,
            interval: self.timeframe.interval(),
            source: self.source.clone(),
        }
    }

    fn check_len(&self, series: &Series) -> Result<()> {
        match self.min_bars {
            Some(need) if series.len() < need => Err(AnalysisError::InsufficientData {
                need,
                got: series.len(),
            }),
            _ => Ok(()),
        }
    }
}

/// Identity of a cached series
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: &'static str,
    pub source: String,
}

/// Source of OHLCV history. Implementations return validated series in
/// ascending date order; failures map to `AnalysisError::Provider`.
pub trait MarketDataProvider: Send + Sync {
    fn fetch(&self, request: &SeriesRequest) -> Result<Series>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    series: Arc<Series>,
    fetched_at: DateTime<Utc>,
}

/// Read-mostly cache of fetched series keyed by [`CacheKey`]
#[derive(Debug, Default)]
pub struct SeriesCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
}

fn poisoned<T>(_: T) -> AnalysisError {
    AnalysisError::Provider("series cache lock poisoned".into())
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` are refetched
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn fresh(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now() - entry.fetched_at <= ttl,
            None => true,
        }
    }

    /// Cached series for `request`, fetching through `provider` on a miss
    pub fn get_or_fetch(
        &self,
        provider: &dyn MarketDataProvider,
        request: &SeriesRequest,
    ) -> Result<Arc<Series>> {
        request.validate()?;
        let key = request.key();

        if let Some(entry) = self.entries.read().map_err(poisoned)?.get(&key) {
            if self.fresh(entry) {
                debug!("cache hit for {} {}", key.ticker, key.interval);
                request.check_len(&entry.series)?;
                return Ok(Arc::clone(&entry.series));
            }
        }

        debug!("cache miss for {} {}, fetching", key.ticker, key.interval);
        let mut series = provider.fetch(request)?;
        if series.symbol().is_none() {
            series = series.with_symbol(request.ticker.clone());
        }
        let series = Arc::new(series);
        self.entries.write().map_err(poisoned)?.insert(
            key,
            CacheEntry {
                series: Arc::clone(&series),
                fetched_at: Utc::now(),
            },
        );
        request.check_len(&series)?;
        Ok(series)
    }

    /// Drop one cached window; returns whether it was present
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().map_err(poisoned)?.remove(key).is_some())
    }

    /// Drop every window of `ticker`; returns how many were removed
    pub fn invalidate_ticker(&self, ticker: &str) -> Result<usize> {
        let ticker = ticker.to_uppercase();
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|k, _| k.ticker != ticker);
        Ok(before - entries.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Entry count. A poisoned lock still reports what the map holds, while
    /// fetch and invalidation on that cache return [`AnalysisError::Provider`]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        calls: AtomicUsize,
        bars: usize,
    }

    impl MockProvider {
        fn new(bars: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                bars,
            }
        }
    }

    impl MarketDataProvider for MockProvider {
        fn fetch(&self, request: &SeriesRequest) -> Result<Series> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.ticker == "FAIL" {
                return Err(AnalysisError::Provider("upstream unavailable".into()));
            }
            let bars = (0..self.bars)
                .map(|i| {
                    let c = 100.0 + i as f64;
                    Bar::new(request.start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 1_000.0)
                })
                .collect();
            Series::new(bars, request.timeframe)
        }
    }

    fn request(ticker: &str) -> SeriesRequest {
        SeriesRequest::new(
            ticker,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    #[test]
    fn test_second_request_hits_cache() {
        let provider = MockProvider::new(20);
        let cache = SeriesCache::new();
        let a = cache.get_or_fetch(&provider, &request("abc")).unwrap();
        let b = cache.get_or_fetch(&provider, &request("ABC")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.symbol(), Some("abc"));
    }

    #[test]
    fn test_min_bars_enforced() {
        let provider = MockProvider::new(5);
        let cache = SeriesCache::new();
        let err = cache
            .get_or_fetch(&provider, &request("abc").min_bars(10))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { need: 10, got: 5 }));
        // a looser request is served from the cached copy
        assert!(cache.get_or_fetch(&provider, &request("abc")).is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidation() {
        let provider = MockProvider::new(3);
        let cache = SeriesCache::new();
        cache.get_or_fetch(&provider, &request("abc")).unwrap();
        cache
            .get_or_fetch(&provider, &request("abc").timeframe(TimeFrame::Weekly))
            .unwrap();
        cache.get_or_fetch(&provider, &request("xyz")).unwrap();
        assert_eq!(cache.len(), 3);

        assert!(cache.invalidate(&request("xyz").key()).unwrap());
        assert!(!cache.invalidate(&request("xyz").key()).unwrap());
        assert_eq!(cache.invalidate_ticker("abc").unwrap(), 2);
        assert!(cache.is_empty());

        cache.get_or_fetch(&provider, &request("abc")).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_provider_error_is_not_cached() {
        let provider = MockProvider::new(3);
        let cache = SeriesCache::new();
        assert!(matches!(
            cache.get_or_fetch(&provider, &request("FAIL")),
            Err(AnalysisError::Provider(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_refetched() {
        let provider = MockProvider::new(3);
        let cache = SeriesCache::new().with_ttl(Duration::zero() - Duration::seconds(1));
        cache.get_or_fetch(&provider, &request("abc")).unwrap();
        cache.get_or_fetch(&provider, &request("abc")).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_poisoned_cache_reports_entries_and_errors() {
        let provider = MockProvider::new(3);
        let cache = SeriesCache::new();
        cache.get_or_fetch(&provider, &request("abc")).unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.entries.write().unwrap();
            panic!("writer failed mid-update");
        }));
        assert!(panicked.is_err());

        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
        assert!(matches!(
            cache.get_or_fetch(&provider, &request("abc")),
            Err(AnalysisError::Provider(_))
        ));
        assert!(matches!(cache.clear(), Err(AnalysisError::Provider(_))));
        assert!(cache.invalidate_ticker("abc").is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_validation() {
        let bad = SeriesRequest::new(
            "abc",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(bad.validate().is_err());
        assert!(request(" ").validate().is_err());
        let bench = request("abc").min_bars(100).for_ticker("SPY");
        assert_eq!(bench.ticker, "SPY");
        assert_eq!(bench.min_bars, None);
    }
}
