use skywatch_common::{ElementSet, NoradId};
use tracing::{debug, warn};

use super::sources::{BulletinSource, CelestrakSource, ElementSource, TleApiSource, build_http_client};
use crate::config::{HttpConfig, SourceConfig};
use crate::error::{AllSourcesFailed, SourceFailure};

/// Ordered list of element fetchers, tried until one succeeds.
pub struct SourceChain {
    sources: Vec<Box<dyn ElementSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn ElementSource>>) -> Self {
        Self { sources }
    }

    /// Build the chain described by `[[sources]]`, sharing one HTTP client.
    pub fn from_config(sources: &[SourceConfig], http: &HttpConfig) -> anyhow::Result<Self> {
        let client = build_http_client(http)?;

        let sources = sources
            .iter()
            .map(|source| -> Box<dyn ElementSource> {
                match source {
                    SourceConfig::Celestrak { url } => Box::new(CelestrakSource::new(client.clone(), url)),
                    SourceConfig::TleApi { url } => Box::new(TleApiSource::new(client.clone(), url)),
                    SourceConfig::Bulletin { url } => Box::new(BulletinSource::new(client.clone(), url)),
                }
            })
            .collect();

        Ok(Self::new(sources))
    }

    /// Append a fetcher with the lowest priority.
    pub fn push(&mut self, source: Box<dyn ElementSource>) {
        self.sources.push(source);
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Return the first successful fetch in priority order.
    ///
    /// Later sources are never contacted once one succeeds; when all fail the
    /// error lists every reason in chain order.
    pub async fn resolve(&self, norad_id: NoradId) -> Result<ElementSet, AllSourcesFailed> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.fetch(norad_id).await {
                Ok(set) => {
                    debug!(
                        "Resolved catalog #{} from {} after {} failed sources",
                        norad_id,
                        source.name(),
                        failures.len()
                    );
                    return Ok(set);
                }
                Err(reason) => {
                    warn!("Source {} failed for catalog #{}: {}", source.name(), norad_id, reason);
                    failures.push(SourceFailure {
                        fetcher: source.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(AllSourcesFailed { norad_id, failures })
    }
}
