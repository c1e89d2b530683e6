//! In-memory store of the latest fetch results with a staleness guard.
//!
//! Readers clone an `Arc` of the current [`LotlCacheData`] under a short read
//! lock, writers swap in a new one. A reader therefore always sees a single
//! consistent generation, also across [`LotlCache::set_all`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::model::fetch_result::{
    CountryResult, CountryTrustList, EuropeanLotl, EuropeanLotlResult, EuropeanResources,
    EuropeanResourcesResult, FetchResult, PivotChain, PivotResult,
};
use crate::proto::clock::{Clock, unix_millis};


pub const SNAPSHOT_VERSION_V1: &str = "LotlCacheDataV1";

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum CacheCategory {
    EuropeanLotl,
    Pivot,
    EuropeanResources,
    CountrySpecific,
}

#[derive(Debug, Error)]
pub enum LotlCacheError {
    #[error("Cached `{category}` data `{key}` is stale")]
    StaleData { category: CacheCategory, key: String },
    #[error("No `{0}` data cached")]
    Missing(CacheCategory),
    #[error("Unsupported snapshot version `{0}`")]
    UnsupportedVersion(String),
    #[error("Snapshot encoding error: `{0}`")]
    Encoding(#[from] bincode::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: FetchResult<T>,
    pub fetched_at_millis: u64,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now_millis: u64, staleness_millis: u64) -> bool {
        now_millis.saturating_sub(self.fetched_at_millis) <= staleness_millis
    }
}

/// Everything the cache holds. Also the persisted snapshot payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotlCacheData {
    pub european_lotl: Option<CacheEntry<EuropeanLotl>>,
    pub pivot: Option<CacheEntry<PivotChain>>,
    pub european_resources: Option<CacheEntry<EuropeanResources>>,
    /// Keyed by the unique identifier of the country pointer.
    pub countries: BTreeMap<String, CacheEntry<CountryTrustList>>,
    pub timestamps: BTreeMap<String, u64>,
}

impl LotlCacheData {
    /// Encodes as the versioned `(tag, data)` pair.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LotlCacheError> {
        Ok(bincode::serialize(&(SNAPSHOT_VERSION_V1, self))?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LotlCacheError> {
        let version: String = bincode::deserialize(bytes)?;
        if version != SNAPSHOT_VERSION_V1 {
            return Err(LotlCacheError::UnsupportedVersion(version));
        }

        let (_, data): (String, LotlCacheData) = bincode::deserialize(bytes)?;
        Ok(data)
    }
}

/// One complete set of fetch results, committed by [`LotlCache::set_all`].
#[derive(Clone, Debug)]
pub struct LotlCacheUpdate {
    pub european_lotl: EuropeanLotlResult,
    pub pivot: PivotResult,
    pub european_resources: EuropeanResourcesResult,
    pub countries: HashMap<String, CountryResult>,
}

/// Country entries as seen by a reader.
#[derive(Clone, Debug, Default)]
pub struct CountryResults {
    pub fresh: HashMap<String, CountryResult>,
    pub stale: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum CountryChange {
    Replace(CountryResult),
    /// Keeps the cached entry with its original fetch time, if there is one.
    Keep,
    Remove,
}

/// Partial update committed by [`LotlCache::apply_refresh`]. `None` leaves a category untouched.
///
/// When `countries` is set it becomes the complete country map: keys it does not name are dropped.
#[derive(Clone, Debug, Default)]
pub struct LotlCacheRefresh {
    pub european_resources: Option<EuropeanResourcesResult>,
    pub european_lotl: Option<(EuropeanLotlResult, PivotResult)>,
    pub countries: Option<BTreeMap<String, CountryChange>>,
    pub timestamps: Vec<String>,
}

pub struct LotlCache {
    data: RwLock<Arc<LotlCacheData>>,
    staleness_millis: u64,
    clock: Arc<dyn Clock>,
}

impl LotlCache {
    pub fn new(staleness_millis: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(Arc::new(LotlCacheData::default())),
            staleness_millis,
            clock,
        }
    }

    fn current(&self) -> Arc<LotlCacheData> {
        self.data.read().clone()
    }

    fn now_millis(&self) -> u64 {
        unix_millis(self.clock.now_utc())
    }

    fn update(&self, mutate: impl FnOnce(&mut LotlCacheData, u64)) {
        let now = self.now_millis();
        let mut guard = self.data.write();
        mutate(Arc::make_mut(&mut *guard), now);
    }

    fn fresh<T: Clone>(
        &self,
        category: CacheCategory,
        entry: Option<&CacheEntry<T>>,
    ) -> Result<FetchResult<T>, LotlCacheError> {
        let entry = entry.ok_or(LotlCacheError::Missing(category))?;
        if !entry.is_fresh(self.now_millis(), self.staleness_millis) {
            return Err(LotlCacheError::StaleData {
                category,
                key: category.to_string(),
            });
        }
        Ok(entry.value.clone())
    }

    pub fn get_european_lotl(&self) -> Result<EuropeanLotlResult, LotlCacheError> {
        let data = self.current();
        self.fresh(CacheCategory::EuropeanLotl, data.european_lotl.as_ref())
    }

    pub fn get_pivot(&self) -> Result<PivotResult, LotlCacheError> {
        let data = self.current();
        self.fresh(CacheCategory::Pivot, data.pivot.as_ref())
    }

    pub fn get_european_resources(&self) -> Result<EuropeanResourcesResult, LotlCacheError> {
        let data = self.current();
        self.fresh(CacheCategory::EuropeanResources, data.european_resources.as_ref())
    }

    /// Fresh country entries. Stale ones are left out and listed by key.
    pub fn get_country_results(&self) -> CountryResults {
        let data = self.current();
        let now = self.now_millis();

        let mut results = CountryResults::default();
        for (key, entry) in &data.countries {
            if entry.is_fresh(now, self.staleness_millis) {
                results.fresh.insert(key.clone(), entry.value.clone());
            } else {
                results.stale.push(key.clone());
            }
        }
        results
    }

    pub fn staleness_millis(&self) -> u64 {
        self.staleness_millis
    }

    pub fn set_european_lotl(&self, value: EuropeanLotlResult) {
        self.update(|data, now| data.european_lotl = Some(entry(value, now)));
    }

    pub fn set_pivot(&self, value: PivotResult) {
        self.update(|data, now| data.pivot = Some(entry(value, now)));
    }

    pub fn set_european_resources(&self, value: EuropeanResourcesResult) {
        self.update(|data, now| data.european_resources = Some(entry(value, now)));
    }

    pub fn set_country_result(&self, key: String, value: CountryResult) {
        self.update(|data, now| {
            data.countries.insert(key, entry(value, now));
        });
    }

    pub fn remove_country_result(&self, key: &str) {
        self.update(|data, _| {
            data.countries.remove(key);
        });
    }

    /// Replaces all four categories in one step.
    pub fn set_all(&self, update: LotlCacheUpdate) {
        self.update(|data, now| {
            data.european_lotl = Some(entry(update.european_lotl, now));
            data.pivot = Some(entry(update.pivot, now));
            data.european_resources = Some(entry(update.european_resources, now));
            data.countries = update
                .countries
                .into_iter()
                .map(|(key, value)| (key, entry(value, now)))
                .collect();
        });
    }

    /// Applies a refresh in one step. Readers see either the previous or the merged generation.
    pub fn apply_refresh(&self, refresh: LotlCacheRefresh) {
        self.update(|data, now| {
            if let Some(resources) = refresh.european_resources {
                data.european_resources = Some(entry(resources, now));
            }
            if let Some((european_lotl, pivot)) = refresh.european_lotl {
                data.european_lotl = Some(entry(european_lotl, now));
                data.pivot = Some(entry(pivot, now));
            }
            if let Some(countries) = refresh.countries {
                let mut merged = BTreeMap::new();
                for (key, change) in countries {
                    match change {
                        CountryChange::Replace(value) => {
                            merged.insert(key, entry(value, now));
                        }
                        CountryChange::Keep => {
                            if let Some(previous) = data.countries.remove(&key) {
                                merged.insert(key, previous);
                            }
                        }
                        CountryChange::Remove => {}
                    }
                }
                data.countries = merged;
            }
            for name in refresh.timestamps {
                data.timestamps.insert(name, now);
            }
        });
    }

    pub fn set_timestamp(&self, name: &str) {
        self.update(|data, now| {
            data.timestamps.insert(name.to_owned(), now);
        });
    }

    pub fn timestamp(&self, name: &str) -> Option<u64> {
        self.current().timestamps.get(name).copied()
    }

    pub fn snapshot(&self) -> LotlCacheData {
        LotlCacheData::clone(&self.current())
    }

    pub fn restore(&self, data: LotlCacheData) {
        *self.data.write() = Arc::new(data);
    }
}

fn entry<T>(value: FetchResult<T>, fetched_at_millis: u64) -> CacheEntry<T> {
    CacheEntry {
        value,
        fetched_at_millis,
    }
}
