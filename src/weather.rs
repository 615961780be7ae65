use crate::data_client::DataClient;
use crate::features::{FixtureContext, WeatherMetrics};
use crate::upstream::{DataKind, WeatherRecord, param};

const HEAVY_RAIN_MM: f64 = 5.0;
const STRONG_WIND_KPH: f64 = 35.0;

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> Option<WeatherMetrics> {
    let mut params = vec![param("fixture", ctx.fixture_id)];
    if let Some(city) = ctx.city.as_deref() {
        params.push(param("city", city));
    }
    let fetched = client.fetch(DataKind::Weather, &params).await;
    if !fetched.is_real() {
        return None;
    }
    fetched.payload.weather().first().map(compute)
}

pub fn compute(record: &WeatherRecord) -> WeatherMetrics {
    WeatherMetrics {
        temperature_c: record.temperature_c,
        wind_kph: record.wind_kph,
        precipitation_mm: record.precipitation_mm,
        condition: record.condition.clone(),
        goals_multiplier: goals_multiplier(record),
    }
}

/// Scales both sides' expected goals. Rain, wind and temperature extremes suppress scoring.
pub fn goals_multiplier(record: &WeatherRecord) -> f64 {
    let rain = record.precipitation_mm.filter(|v| v.is_finite());
    let wind = record.wind_kph.filter(|v| v.is_finite());
    let temp = record.temperature_c.filter(|v| v.is_finite());

    let mut m: f64 = 1.0;
    if rain.is_some_and(|r| r > HEAVY_RAIN_MM) {
        m -= 0.08;
    }
    if wind.is_some_and(|w| w > STRONG_WIND_KPH) {
        m -= 0.06;
    }
    if temp.is_some_and(|t| !(0.0..=30.0).contains(&t)) {
        m -= 0.04;
    }
    let ideal = rain.is_some_and(|r| r <= 0.0)
        && wind.is_some_and(|w| w < 15.0)
        && temp.is_some_and(|t| (10.0..=22.0).contains(&t));
    if ideal {
        m += 0.02;
    }
    m.clamp(0.8, 1.05)
}
