//! Fans all calculators out for one fixture and folds their slices into a bundle.
//!
//! Calculators run concurrently on the current task and share one deadline. A
//! calculator that misses it contributes its default slice; the others are kept.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::data_client::DataClient;
use crate::config::WEATHER_FEED_SOURCE;
use crate::features::{DataQuality, FixtureContext, MatchFeatureBundle, WeatherMetrics};
use crate::upstream::{DataKind, param};
use crate::{expected_goals, form, head_to_head, injuries, market, venue, weather};

const CALCULATORS: usize = 7;

pub struct FeatureExtractor {
    stats: Arc<DataClient>,
    odds_feed: Option<Arc<DataClient>>,
    weather_feed: Option<Arc<DataClient>>,
    budget: Duration,
}

impl FeatureExtractor {
    pub fn new(stats: Arc<DataClient>, budget: Duration) -> Self {
        Self {
            stats,
            odds_feed: None,
            weather_feed: None,
            budget,
        }
    }

    pub fn with_odds_feed(mut self, client: Arc<DataClient>) -> Self {
        self.odds_feed = Some(client);
        self
    }

    pub fn with_weather_feed(mut self, client: Arc<DataClient>) -> Self {
        self.weather_feed = Some(client);
        self
    }

    /// Every client this extractor talks to, primary first.
    pub fn clients(&self) -> Vec<&DataClient> {
        let mut out = vec![self.stats.as_ref()];
        out.extend(self.odds_feed.as_deref());
        out.extend(self.weather_feed.as_deref());
        out
    }

    pub async fn resolve_fixture(&self, fixture_id: u64) -> FixtureContext {
        let fetched = self
            .stats
            .fetch(DataKind::Fixture, &[param("id", fixture_id)])
            .await;
        let record = fetched
            .payload
            .fixtures()
            .iter()
            .find(|f| f.fixture.id == fixture_id);
        match record {
            Some(r) if fetched.is_real() => FixtureContext::from_record(r),
            _ => {
                warn!(fixture_id, origin = ?fetched.origin, "fixture not resolved, teams unknown");
                FixtureContext::unknown(fixture_id)
            }
        }
    }

    pub async fn extract(&self, ctx: &FixtureContext) -> MatchFeatureBundle {
        let deadline = Instant::now() + self.budget;
        let stats = self.stats.as_ref();
        let odds = self.odds_feed.as_deref().unwrap_or(stats);

        let (form, expected_goals, head_to_head, venue, injuries, market, weather) = tokio::join!(
            within(deadline, "form", form::calculate(stats, ctx)),
            within(deadline, "expected_goals", expected_goals::calculate(stats, ctx)),
            within(deadline, "head_to_head", head_to_head::calculate(stats, ctx)),
            within(deadline, "venue", venue::calculate(stats, ctx)),
            within(deadline, "injuries", injuries::calculate(stats, ctx)),
            within(deadline, "market", market::calculate(odds, ctx)),
            within(deadline, "weather", self.weather(ctx)),
        );

        let mut bundle = MatchFeatureBundle {
            fixture: ctx.clone(),
            form,
            expected_goals,
            head_to_head,
            venue,
            injuries,
            market,
            weather,
            data_quality: DataQuality::default(),
        };

        // Source per calculator, in the same order as `availability`.
        let origins = [
            stats.source(),
            stats.source(),
            stats.source(),
            stats.source(),
            stats.source(),
            odds.source(),
            self.weather_feed
                .as_deref()
                .map_or(WEATHER_FEED_SOURCE, DataClient::source),
        ];
        bundle.data_quality = data_quality(&bundle.availability(), &origins);
        info!(
            fixture_id = ctx.fixture_id,
            completeness = bundle.data_quality.completeness,
            sources = ?bundle.data_quality.sources,
            "features extracted"
        );
        bundle
    }

    /// The stats upstream has no weather endpoint; without a weather feed the slice stays empty.
    async fn weather(&self, ctx: &FixtureContext) -> Option<WeatherMetrics> {
        let Some(client) = self.weather_feed.as_deref() else {
            debug!(fixture_id = ctx.fixture_id, "no weather feed configured");
            return None;
        };
        weather::calculate(client, ctx).await
    }
}

pub fn data_quality(available: &[bool; CALCULATORS], origins: &[&str; CALCULATORS]) -> DataQuality {
    let hits = available.iter().filter(|a| **a).count();
    let mut sources: Vec<String> = Vec::new();
    for (ok, source) in available.iter().zip(origins) {
        if *ok && !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
    DataQuality {
        completeness: hits as f64 / CALCULATORS as f64,
        sources,
    }
}

async fn within<T, F>(deadline: Instant, name: &'static str, fut: F) -> T
where
    T: Default,
    F: Future<Output = T>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(slice) => slice,
        Err(_) => {
            warn!(calculator = name, "calculator timed out, using default");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_is_fraction_of_real_slices() {
        let available = [true, true, false, false, true, true, false];
        let origins = [
            "api-football",
            "api-football",
            "api-football",
            "api-football",
            "api-football",
            "scraper:oddsportal",
            "scraper:openweather",
        ];
        let q = data_quality(&available, &origins);
        assert!((q.completeness - 4.0 / 7.0).abs() < 1e-12);
        assert_eq!(q.sources, vec!["api-football", "scraper:oddsportal"]);
    }

    #[test]
    fn nothing_real_means_no_sources() {
        let q = data_quality(&[false; 7], &["x"; 7]);
        assert_eq!(q.completeness, 0.0);
        assert!(q.sources.is_empty());
    }
}
