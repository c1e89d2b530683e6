use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
#[cfg(feature = "config_env")]
use figment::providers::Env;
#[cfg(feature = "config_json")]
use figment::providers::Json;
#[cfg(feature = "config_yaml")]
use figment::providers::Yaml;
use figment::providers::{Data, Format};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use strum::Display;

use super::{ConfigParsingError, ConfigValidationError};

pub const DEFAULT_CACHE_STALENESS: Duration = Duration::from_secs(24 * 60 * 60);

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotlConfig {
    pub lotl_url: String,
    #[serde(default)]
    pub official_journal: OfficialJournalConfig,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub cache_staleness: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub refresh_interval: Option<Duration>,
    #[serde(default)]
    pub country_allow_list: Vec<String>,
    #[serde(default)]
    pub country_deny_list: Vec<String>,
    #[serde(default)]
    pub on_country_fetch_failure: OnCountryFetchFailure,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialJournalConfig {
    /// URL of the Official Journal publication announcing the LOTL signing certificates.
    #[serde(default)]
    pub publication: String,
    /// Base64 DER certificates from that publication.
    #[serde(default)]
    pub certificates: Vec<String>,
}

pub enum InputFormat {
    #[cfg(feature = "config_yaml")]
    Yaml(Data<Yaml>),
    #[cfg(feature = "config_json")]
    Json(Data<Json>),
}

impl InputFormat {
    #[cfg(feature = "config_yaml")]
    pub fn yaml_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Yaml(Yaml::file(p))
    }

    #[cfg(feature = "config_yaml")]
    pub fn yaml_str(s: impl AsRef<str>) -> InputFormat {
        InputFormat::Yaml(Yaml::string(s.as_ref()))
    }

    #[cfg(feature = "config_json")]
    pub fn json_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Json(Json::file(p))
    }

    #[cfg(feature = "config_json")]
    pub fn json_str(s: impl AsRef<str>) -> InputFormat {
        InputFormat::Json(Json::string(s.as_ref()))
    }
}

impl LotlConfig {
    pub fn from_files(files: &[impl AsRef<Path>]) -> Result<Self, ConfigParsingError> {
        let mut inputs: Vec<InputFormat> = Vec::with_capacity(files.len());

        for path in files {
            #[cfg(feature = "config_yaml")]
            if path
                .as_ref()
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
            {
                inputs.push(InputFormat::yaml_file(path));
                continue;
            }

            #[cfg(feature = "config_json")]
            if path.as_ref().extension() == Some("json".as_ref()) {
                inputs.push(InputFormat::json_file(path));
                continue;
            }

            return Err(ConfigParsingError::GeneralParsingError(format!(
                "Unsupported file or missing file extension: {:?}",
                path.as_ref().to_str()
            )));
        }

        Self::parse(inputs)
    }

    #[cfg(feature = "config_yaml")]
    pub fn from_yaml(
        configs: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ConfigParsingError> {
        Self::parse(configs.into_iter().map(InputFormat::yaml_str))
    }

    /// Later inputs override earlier ones, `LOTL_` prefixed environment variables override all.
    pub fn parse(inputs: impl IntoIterator<Item = InputFormat>) -> Result<Self, ConfigParsingError> {
        let mut figment = Figment::new();

        for data in inputs {
            figment = match data {
                #[cfg(feature = "config_yaml")]
                InputFormat::Yaml(content) => figment.merge(content),
                #[cfg(feature = "config_json")]
                InputFormat::Json(content) => figment.merge(content),
            };
        }

        #[cfg(feature = "config_env")]
        {
            figment = figment.merge(Env::prefixed("LOTL_").split("__").lowercase(false));
        }

        figment
            .extract::<LotlConfig>()
            .map_err(|e| ConfigParsingError::GeneralParsingError(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OnCountryFetchFailure {
    /// Drop the cached entry of a country whose refresh failed.
    #[default]
    RemoveOnFailure,
    /// Keep the previously cached entry.
    IgnoreFailure,
    /// Fail the whole refresh.
    ThrowOnFailure,
}

/// Computes the delay before the next refresh from the previous one.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait RefreshIntervalCalculator: Send + Sync {
    fn next_delay(&self, last_delay: Option<Duration>) -> Duration;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedRefreshInterval {
    interval: Duration,
}

impl FixedRefreshInterval {
    pub fn new(interval: Duration) -> Result<Self, ConfigValidationError> {
        if interval.is_zero() {
            return Err(ConfigValidationError::NonPositiveRefreshInterval);
        }
        Ok(Self { interval })
    }
}

impl RefreshIntervalCalculator for FixedRefreshInterval {
    fn next_delay(&self, _last_delay: Option<Duration>) -> Duration {
        self.interval
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CountryFilter {
    #[default]
    All,
    Allow(BTreeSet<String>),
    Deny(BTreeSet<String>),
}

impl CountryFilter {
    pub fn accepts(&self, country_code: &str) -> bool {
        let country_code = country_code.trim().to_uppercase();
        match self {
            CountryFilter::All => true,
            CountryFilter::Allow(countries) => countries.contains(&country_code),
            CountryFilter::Deny(countries) => !countries.contains(&country_code),
        }
    }
}

#[derive(Clone)]
pub struct LotlFetchingProperties {
    cache_staleness: Duration,
    refresh_interval: Arc<dyn RefreshIntervalCalculator>,
    country_filter: CountryFilter,
    on_country_fetch_failure: OnCountryFetchFailure,
}

impl LotlFetchingProperties {
    pub fn builder() -> LotlFetchingPropertiesBuilder {
        LotlFetchingPropertiesBuilder::default()
    }

    pub fn cache_staleness(&self) -> Duration {
        self.cache_staleness
    }

    pub fn cache_staleness_millis(&self) -> u64 {
        u64::try_from(self.cache_staleness.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn refresh_interval(&self) -> &Arc<dyn RefreshIntervalCalculator> {
        &self.refresh_interval
    }

    pub fn country_filter(&self) -> &CountryFilter {
        &self.country_filter
    }

    pub fn on_country_fetch_failure(&self) -> OnCountryFetchFailure {
        self.on_country_fetch_failure
    }
}

impl std::fmt::Debug for LotlFetchingProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotlFetchingProperties")
            .field("cache_staleness", &self.cache_staleness)
            .field("country_filter", &self.country_filter)
            .field("on_country_fetch_failure", &self.on_country_fetch_failure)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct LotlFetchingPropertiesBuilder {
    cache_staleness: Option<Duration>,
    fixed_refresh_interval: Option<Duration>,
    refresh_interval: Option<Arc<dyn RefreshIntervalCalculator>>,
    allow_list: Vec<String>,
    deny_list: Vec<String>,
    on_country_fetch_failure: OnCountryFetchFailure,
}

impl LotlFetchingPropertiesBuilder {
    pub fn cache_staleness(mut self, staleness: Duration) -> Self {
        self.cache_staleness = Some(staleness);
        self
    }

    pub fn fixed_refresh_interval(mut self, interval: Duration) -> Self {
        self.fixed_refresh_interval = Some(interval);
        self
    }

    pub fn refresh_interval(mut self, calculator: Arc<dyn RefreshIntervalCalculator>) -> Self {
        self.refresh_interval = Some(calculator);
        self
    }

    pub fn allow_countries(mut self, countries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allow_list.extend(countries.into_iter().map(Into::into));
        self
    }

    pub fn deny_countries(mut self, countries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deny_list.extend(countries.into_iter().map(Into::into));
        self
    }

    pub fn on_country_fetch_failure(mut self, strategy: OnCountryFetchFailure) -> Self {
        self.on_country_fetch_failure = strategy;
        self
    }

    pub fn build(self) -> Result<LotlFetchingProperties, ConfigValidationError> {
        let cache_staleness = self.cache_staleness.unwrap_or(DEFAULT_CACHE_STALENESS);
        if cache_staleness.is_zero() {
            return Err(ConfigValidationError::NonPositiveStaleness);
        }

        let refresh_interval = match (self.refresh_interval, self.fixed_refresh_interval) {
            (Some(calculator), _) => calculator,
            (None, Some(interval)) => Arc::new(FixedRefreshInterval::new(interval)?),
            (None, None) => Arc::new(FixedRefreshInterval::new(cache_staleness / 4)?),
        };

        let country_filter = match (self.allow_list.is_empty(), self.deny_list.is_empty()) {
            (true, true) => CountryFilter::All,
            (false, true) => CountryFilter::Allow(normalize_country_codes(self.allow_list)?),
            (true, false) => CountryFilter::Deny(normalize_country_codes(self.deny_list)?),
            (false, false) => return Err(ConfigValidationError::ConflictingCountryFilters),
        };

        Ok(LotlFetchingProperties {
            cache_staleness,
            refresh_interval,
            country_filter,
            on_country_fetch_failure: self.on_country_fetch_failure,
        })
    }
}

fn normalize_country_codes(
    countries: Vec<String>,
) -> Result<BTreeSet<String>, ConfigValidationError> {
    countries
        .into_iter()
        .map(|country| {
            let code = country.trim().to_uppercase();
            if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                Ok(code)
            } else {
                Err(ConfigValidationError::InvalidCountryCode(country))
            }
        })
        .collect()
}

impl TryFrom<&LotlConfig> for LotlFetchingProperties {
    type Error = ConfigValidationError;

    fn try_from(config: &LotlConfig) -> Result<Self, Self::Error> {
        let mut builder = LotlFetchingProperties::builder()
            .allow_countries(config.country_allow_list.iter().cloned())
            .deny_countries(config.country_deny_list.iter().cloned())
            .on_country_fetch_failure(config.on_country_fetch_failure);

        if let Some(staleness) = config.cache_staleness {
            builder = builder.cache_staleness(staleness);
        }
        if let Some(interval) = config.refresh_interval {
            builder = builder.fixed_refresh_interval(interval);
        }

        builder.build()
    }
}
