//! Lifecycle of the LOTL cache: initial load, periodic refresh and shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use strum::Display;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::lotl_config::{LotlConfig, LotlFetchingProperties, OnCountryFetchFailure};
use crate::model::certificate::Certificate;
use crate::model::fetch_result::{
    CountryResult, EuropeanLotlResult, EuropeanResourcesResult, FetchResult, PivotResult,
};
use crate::model::report::ValidationReport;
use crate::proto::clock::Clock;
use crate::proto::resource_retriever::ResourceRetriever;
use crate::provider::lotl_cache::{
    CountryChange, CountryResults, LotlCache, LotlCacheData, LotlCacheRefresh, LotlCacheUpdate,
};
use crate::provider::lotl_fetcher::country_specific::CountrySpecificFetcherImpl;
use crate::provider::lotl_fetcher::european_lotl::EuropeanLotlFetcherImpl;
use crate::provider::lotl_fetcher::european_resource::{
    ConfiguredEuropeanTrustedList, EuropeanResourceFetcherImpl,
};
use crate::provider::lotl_fetcher::pivot::PivotFetcherImpl;
use crate::provider::lotl_fetcher::{
    CountrySpecificFetcher, EuropeanLotlFetcher, EuropeanResourceFetcher,
    EuropeanTrustedListConfiguration, PivotFetcher,
};
use crate::service::error::ServiceError;
use crate::service::qualification::QualificationService;
use crate::service::trust_list_validator::TrustListValidator;
use crate::service::trusted_store::{CertificateSource, TrustedListContexts, TrustedStore};


pub const LAST_REFRESH_TIMESTAMP: &str = "last_refresh";

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

#[derive(Clone)]
pub struct LotlFetchers {
    pub european_lotl: Arc<dyn EuropeanLotlFetcher>,
    pub pivot: Arc<dyn PivotFetcher>,
    pub european_resources: Arc<dyn EuropeanResourceFetcher>,
    pub country_specific: Arc<dyn CountrySpecificFetcher>,
}

impl LotlFetchers {
    /// Default fetchers reading through `retriever`.
    pub fn new(
        retriever: Arc<dyn ResourceRetriever>,
        configuration: Arc<dyn EuropeanTrustedListConfiguration>,
        properties: &LotlFetchingProperties,
    ) -> Self {
        Self {
            european_lotl: Arc::new(EuropeanLotlFetcherImpl::new(
                retriever.clone(),
                configuration.trusted_list_uri(),
            )),
            pivot: Arc::new(PivotFetcherImpl::new(retriever.clone())),
            european_resources: Arc::new(EuropeanResourceFetcherImpl::new(configuration)),
            country_specific: Arc::new(CountrySpecificFetcherImpl::new(
                retriever,
                properties.country_filter().clone(),
            )),
        }
    }
}

pub struct LotlService {
    fetchers: LotlFetchers,
    properties: LotlFetchingProperties,
    cache: Arc<LotlCache>,
    validator: TrustListValidator,
    trusted_store: Arc<TrustedStore>,
    qualification: QualificationService,
    state: Mutex<ServiceState>,
    cancellation_token: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LotlService {
    pub fn new(
        fetchers: LotlFetchers,
        properties: LotlFetchingProperties,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(LotlCache::new(
            properties.cache_staleness_millis(),
            clock.clone(),
        ));
        let trusted_store = Arc::new(TrustedStore::with_clock(clock));

        Self {
            validator: TrustListValidator::new(cache.clone(), properties.country_filter().clone()),
            qualification: QualificationService::new(trusted_store.clone()),
            fetchers,
            properties,
            cache,
            trusted_store,
            state: Mutex::new(ServiceState::Uninitialized),
            cancellation_token: CancellationToken::new(),
            refresh_task: Mutex::new(None),
        }
    }

    pub fn from_config(
        config: &LotlConfig,
        retriever: Arc<dyn ResourceRetriever>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let properties = LotlFetchingProperties::try_from(config)?;
        let configuration = Arc::new(ConfiguredEuropeanTrustedList::from(config));
        let fetchers = LotlFetchers::new(retriever, configuration, &properties);
        Ok(Self::new(fetchers, properties, clock))
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn transition(&self, from: &[ServiceState], to: ServiceState) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return Err(ServiceError::InvalidState(*state));
        }
        *state = to;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), ServiceError> {
        match self.state() {
            ServiceState::Ready => Ok(()),
            state => Err(ServiceError::InvalidState(state)),
        }
    }

    /// Runs the whole pipeline once and commits it if the European part validates.
    #[tracing::instrument(level = "debug", skip_all, err(Debug))]
    pub async fn initialize_cache(&self) -> Result<(), ServiceError> {
        self.transition(&[ServiceState::Uninitialized], ServiceState::Initializing)?;

        match self.fetch_all().await {
            Ok(update) => {
                self.cache.set_all(update);
                self.cache.set_timestamp(LAST_REFRESH_TIMESTAMP);
                self.sync_trusted_store();
                *self.state.lock() = ServiceState::Ready;
                tracing::info!("LOTL cache initialized");
                Ok(())
            }
            Err(error) => {
                *self.state.lock() = ServiceState::Uninitialized;
                Err(error)
            }
        }
    }

    async fn fetch_all(&self) -> Result<LotlCacheUpdate, ServiceError> {
        let european_lotl = self.fetchers.european_lotl.fetch().await;
        let european_resources = self.fetchers.european_resources.fetch().await;

        let (pivot, countries) = match &european_lotl.payload {
            Some(lotl) => {
                let pivot = self
                    .fetchers
                    .pivot
                    .fetch(&lotl.xml, official_journal_certificates(&european_resources))
                    .await;
                let countries = if pivot.is_committable() {
                    self.fetchers.country_specific.fetch(&lotl.xml).await?
                } else {
                    HashMap::new()
                };
                (pivot, countries)
            }
            None => (FetchResult::empty(ValidationReport::new()), HashMap::new()),
        };

        let update = LotlCacheUpdate {
            european_lotl,
            pivot,
            european_resources,
            countries,
        };

        let report = self.validator.validate_fetched_data(&update);
        if !report.is_valid() {
            return Err(ServiceError::validation_failed(report));
        }

        let failed = update
            .countries
            .values()
            .filter(|result| !result.is_committable())
            .count();
        if failed > 0 {
            tracing::warn!("{failed} national trusted list(s) could not be validated");
        }

        Ok(update)
    }

    /// Fetches everything again and commits each category whose new result is usable.
    ///
    /// Failed national lists are handled per [`OnCountryFetchFailure`]. All changes
    /// of one refresh become visible to readers at once.
    #[tracing::instrument(level = "debug", skip_all, err(Debug))]
    pub async fn try_and_refresh_cache(&self) -> Result<(), ServiceError> {
        self.ensure_ready()?;

        let european_lotl = self.fetchers.european_lotl.fetch().await;
        let european_resources = self.fetchers.european_resources.fetch().await;

        let mut refresh = LotlCacheRefresh {
            timestamps: vec![LAST_REFRESH_TIMESTAMP.to_owned()],
            ..Default::default()
        };
        let certificates = if european_resources.is_committable() {
            let certificates = official_journal_certificates(&european_resources).to_vec();
            refresh.european_resources = Some(european_resources);
            certificates
        } else {
            tracing::warn!("EU resources refresh failed, keeping previous data");
            self.cache
                .snapshot()
                .european_resources
                .and_then(|entry| entry.value.payload)
                .map(|resources| resources.official_journal_certificates)
                .unwrap_or_default()
        };

        let mut result = Ok(());
        match european_lotl.payload.clone().filter(|_| european_lotl.is_committable()) {
            None => tracing::warn!("LOTL refresh failed, keeping previous data"),
            Some(lotl) => {
                let pivot = self.fetchers.pivot.fetch(&lotl.xml, &certificates).await;
                if pivot.is_committable() {
                    refresh.european_lotl = Some((european_lotl, pivot));
                    let countries = self.fetchers.country_specific.fetch(&lotl.xml).await?;
                    let (changes, failure) = self.country_changes(countries);
                    refresh.countries = Some(changes);
                    result = failure;
                } else {
                    tracing::warn!("LOTL signature could not be verified, keeping previous data");
                }
            }
        }

        self.cache.apply_refresh(refresh);
        self.sync_trusted_store();
        result
    }

    /// Decides per announced list what happens to the cache. Lists no longer announced are dropped.
    fn country_changes(
        &self,
        countries: HashMap<String, CountryResult>,
    ) -> (BTreeMap<String, CountryChange>, Result<(), ServiceError>) {
        let countries: BTreeMap<String, CountryResult> = countries.into_iter().collect();
        let mut first_failure = None;
        let mut changes = BTreeMap::new();

        for (key, result) in countries {
            if result.is_committable() {
                changes.insert(key, CountryChange::Replace(result));
                continue;
            }

            let change = match self.properties.on_country_fetch_failure() {
                OnCountryFetchFailure::RemoveOnFailure => {
                    tracing::warn!("Removing national trusted list {key} after failed refresh");
                    CountryChange::Remove
                }
                OnCountryFetchFailure::IgnoreFailure => {
                    tracing::warn!("Keeping previous national trusted list {key}");
                    CountryChange::Keep
                }
                OnCountryFetchFailure::ThrowOnFailure => {
                    tracing::warn!("National trusted list {key} refresh failed");
                    first_failure.get_or_insert_with(|| key.clone());
                    CountryChange::Keep
                }
            };
            changes.insert(key, change);
        }

        let result = match first_failure {
            Some(key) => Err(ServiceError::CountryRefreshFailed(key)),
            None => Ok(()),
        };
        (changes, result)
    }

    /// Rebuilds the trusted store from the cached national lists. Each list
    /// stays trusted until its cache entry goes stale.
    fn sync_trusted_store(&self) {
        let staleness_millis = self.cache.staleness_millis();
        let lists: Vec<TrustedListContexts> = self
            .cache
            .snapshot()
            .countries
            .into_values()
            .filter_map(|entry| {
                let trust_list = entry.value.payload?;
                self.properties
                    .country_filter()
                    .accepts(&trust_list.pointer.scheme_territory)
                    .then(|| TrustedListContexts {
                        contexts: trust_list.contexts,
                        expires_at_millis: Some(
                            entry.fetched_at_millis.saturating_add(staleness_millis),
                        ),
                    })
            })
            .collect();

        tracing::debug!(
            "Trusted store holds {} service context(s)",
            lists.iter().map(|list| list.contexts.len()).sum::<usize>()
        );
        self.trusted_store.replace_trusted_lists(lists);
    }

    /// Spawns the background refresh. Calling it again while running has no effect.
    ///
    /// The task holds the service weakly and ends once the service is dropped.
    pub fn start_refresh_loop(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.ensure_ready()?;

        let mut refresh_task = self.refresh_task.lock();
        if refresh_task.is_some() {
            return Ok(());
        }

        let service = Arc::downgrade(self);
        let refresh_interval = self.properties.refresh_interval().clone();
        let token = self.cancellation_token.clone();
        let handle = tokio::spawn(
            async move {
                let mut last_delay: Option<Duration> = None;
                loop {
                    let delay = refresh_interval.next_delay(last_delay);
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!("Stopping LOTL refresh loop");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let Some(service) = Weak::upgrade(&service) else {
                        tracing::debug!("LOTL service dropped, stopping refresh loop");
                        break;
                    };
                    if let Err(error) = service.try_and_refresh_cache().await {
                        tracing::warn!("LOTL refresh failed: {error}");
                    }
                    last_delay = Some(delay);
                }
            }
            .in_current_span(),
        );
        *refresh_task = Some(handle);
        Ok(())
    }

    /// Stops the refresh loop and waits for it to finish.
    #[tracing::instrument(level = "debug", skip_all, err(Debug))]
    pub async fn close(&self) -> Result<(), ServiceError> {
        *self.state.lock() = ServiceState::Closed;
        self.cancellation_token.cancel();

        let handle = self.refresh_task.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|error| ServiceError::RefreshTask(error.to_string()))?;
        }
        Ok(())
    }

    pub fn get_european_lotl(&self) -> Result<EuropeanLotlResult, ServiceError> {
        Ok(self.cache.get_european_lotl()?)
    }

    pub fn get_pivot(&self) -> Result<PivotResult, ServiceError> {
        Ok(self.cache.get_pivot()?)
    }

    pub fn get_european_resources(&self) -> Result<EuropeanResourcesResult, ServiceError> {
        Ok(self.cache.get_european_resources()?)
    }

    /// Fresh national results. Stale entries are listed separately by key.
    pub fn get_country_results(&self) -> CountryResults {
        self.cache.get_country_results()
    }

    pub fn validate(&self) -> ValidationReport {
        self.validator.validate()
    }

    pub fn get_national_trusted_certificates(&self) -> Vec<Certificate> {
        self.validator.get_national_trusted_certificates()
    }

    pub fn check_if_cert_is_trusted(
        &self,
        report: &mut ValidationReport,
        source: CertificateSource,
        certificate: &Certificate,
        time: OffsetDateTime,
    ) -> bool {
        self.trusted_store
            .check_if_cert_is_trusted(report, source, certificate, time)
    }

    pub fn trusted_store(&self) -> &Arc<TrustedStore> {
        &self.trusted_store
    }

    pub fn qualification(&self) -> &QualificationService {
        &self.qualification
    }

    pub fn timestamp(&self, name: &str) -> Option<u64> {
        self.cache.timestamp(name)
    }

    pub fn snapshot(&self) -> LotlCacheData {
        self.cache.snapshot()
    }

    /// Replaces the cache with a snapshot, e.g. one persisted by an earlier run.
    pub fn restore_cache(&self, data: LotlCacheData) -> Result<(), ServiceError> {
        self.transition(
            &[ServiceState::Uninitialized, ServiceState::Ready],
            ServiceState::Ready,
        )?;
        self.cache.restore(data);
        self.sync_trusted_store();
        Ok(())
    }
}

impl Drop for LotlService {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

fn official_journal_certificates(resources: &EuropeanResourcesResult) -> &[Certificate] {
    resources
        .payload
        .as_ref()
        .map(|resources| resources.official_journal_certificates.as_slice())
        .unwrap_or_default()
}
