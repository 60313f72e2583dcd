use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::errors::{short_type_name, FetcherError};
use crate::models::settings::{
    FetcherSettings, SourceSettings, ALPHA_VANTAGE, FRANKFURTER, OPEN_EXCHANGE_RATES, TIINGO,
};

use super::alphavantage::AlphaVantageSource;
use super::frankfurter::FrankfurterSource;
use super::open_exchange_rates::OpenExchangeRatesSource;
use super::tiingo::TiingoSource;
use super::traits::{DataSource, Processor};

type CapabilityKey = (TypeId, TypeId);

struct Candidate {
    source_name: String,
    /// Holds an `Arc<dyn Processor<Req, Res>>` for the entry's key.
    processor: Box<dyn Any + Send + Sync>,
}

/// Capability map: for every (request type, result type) pair, the data
/// sources able to serve it, in registration order.
///
/// Registration is explicit. Each [`DataSource`] adds one processor per
/// capability; first registered is first tried.
#[derive(Default)]
pub struct SourceRegistry {
    capabilities: HashMap<CapabilityKey, Vec<Candidate>>,
    /// Human-readable `(request, result)` names per key, for diagnostics.
    labels: HashMap<CapabilityKey, (String, String)>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, candidates) in &self.capabilities {
            let names: Vec<&str> = candidates.iter().map(|c| c.source_name.as_str()).collect();
            map.entry(&self.labels.get(key), &names);
        }
        map.finish()
    }
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in source whose settings allow it.
    ///
    /// Order: Tiingo, Alpha Vantage, Frankfurter, Open Exchange Rates. Sources
    /// that need credentials are skipped when no key is configured.
    pub fn from_settings(settings: &FetcherSettings) -> Self {
        let mut registry = Self::new();
        let defaults = SourceSettings::default();
        let source = |key: &str| settings.source(key).unwrap_or(&defaults);

        // Tiingo: instrument prices and splits, requires token
        if let Some(token) = settings.api_key(TIINGO) {
            registry.add_source(Arc::new(TiingoSource::new(token, source(TIINGO))));
        }

        // Alpha Vantage: instrument prices, requires API key (fallback)
        if let Some(key) = settings.api_key(ALPHA_VANTAGE) {
            registry.add_source(Arc::new(AlphaVantageSource::new(key, source(ALPHA_VANTAGE))));
        }

        // Frankfurter: exchange rates, no API key needed
        registry.add_source(Arc::new(FrankfurterSource::new(source(FRANKFURTER))));

        // Open Exchange Rates: latest exchange rates, requires app id (fallback)
        if let Some(app_id) = settings.api_key(OPEN_EXCHANGE_RATES) {
            registry.add_source(Arc::new(OpenExchangeRatesSource::new(
                app_id,
                source(OPEN_EXCHANGE_RATES),
            )));
        }

        registry
    }

    /// Register every capability of a data source.
    pub fn add_source<S: DataSource>(&mut self, source: Arc<S>) {
        debug!("Registering data source '{}'", source.name());
        source.register_capabilities(self);
    }

    /// Register a single processor for the `(Req, Res)` pair.
    pub fn register<Req, Res, P>(&mut self, source_name: impl Into<String>, processor: Arc<P>)
    where
        Req: Send + Sync + 'static,
        Res: Send + 'static,
        P: Processor<Req, Res> + 'static,
    {
        let key = (TypeId::of::<Req>(), TypeId::of::<Res>());
        let processor: Arc<dyn Processor<Req, Res>> = processor;
        self.labels
            .entry(key)
            .or_insert_with(|| (short_type_name::<Req>(), short_type_name::<Res>()));
        self.capabilities.entry(key).or_default().push(Candidate {
            source_name: source_name.into(),
            processor: Box::new(processor),
        });
    }

    fn candidates<Req, Res>(&self) -> Option<&Vec<Candidate>>
    where
        Req: 'static,
        Res: 'static,
    {
        self.capabilities
            .get(&(TypeId::of::<Req>(), TypeId::of::<Res>()))
            .filter(|c| !c.is_empty())
    }

    fn downcast<Req, Res>(candidate: &Candidate) -> Option<Arc<dyn Processor<Req, Res>>>
    where
        Req: Send + Sync + 'static,
        Res: Send + 'static,
    {
        candidate
            .processor
            .downcast_ref::<Arc<dyn Processor<Req, Res>>>()
            .cloned()
    }

    /// All sources serving `(Req, Res)`, in registration order.
    ///
    /// An unregistered pair is a configuration error, reported as
    /// [`FetcherError::NoSources`].
    pub fn sources_for<Req, Res>(&self) -> Result<Vec<Arc<dyn Processor<Req, Res>>>, FetcherError>
    where
        Req: Send + Sync + 'static,
        Res: Send + 'static,
    {
        self.candidates::<Req, Res>()
            .map(|candidates| {
                candidates
                    .iter()
                    .filter_map(Self::downcast::<Req, Res>)
                    .collect::<Vec<_>>()
            })
            .filter(|sources| !sources.is_empty())
            .ok_or_else(FetcherError::no_sources::<Req, Res>)
    }

    /// Like [`sources_for`](Self::sources_for), but the named sources come
    /// first, in the given order. Unknown names are ignored; the remaining
    /// sources keep registration order.
    pub fn sources_for_preferring<Req, Res>(
        &self,
        preferred: &[&str],
    ) -> Result<Vec<Arc<dyn Processor<Req, Res>>>, FetcherError>
    where
        Req: Send + Sync + 'static,
        Res: Send + 'static,
    {
        let candidates = self
            .candidates::<Req, Res>()
            .ok_or_else(FetcherError::no_sources::<Req, Res>)?;

        let rank = |c: &Candidate| {
            preferred
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&c.source_name))
                .unwrap_or(preferred.len())
        };
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        // Stable sort keeps registration order within the same rank.
        ordered.sort_by_key(|c| rank(*c));

        let sources: Vec<_> = ordered
            .into_iter()
            .filter_map(Self::downcast::<Req, Res>)
            .collect();
        if sources.is_empty() {
            return Err(FetcherError::no_sources::<Req, Res>());
        }
        Ok(sources)
    }

    /// Names of the sources serving `(Req, Res)`, in registration order.
    pub fn source_names_for<Req, Res>(&self) -> Vec<String>
    where
        Req: 'static,
        Res: 'static,
    {
        self.candidates::<Req, Res>()
            .map(|c| c.iter().map(|c| c.source_name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn supports<Req, Res>(&self) -> bool
    where
        Req: 'static,
        Res: 'static,
    {
        self.candidates::<Req, Res>().is_some()
    }

    /// Number of distinct request/result pairs with at least one source.
    pub fn capability_count(&self) -> usize {
        self.capabilities.values().filter(|c| !c.is_empty()).count()
    }
}
