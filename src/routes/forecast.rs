//! Demo weather forecast endpoint.

use axum::{Extension, Json};
use chrono::{Duration, Local, NaiveDate};
use rand::Rng;
use serde::Serialize;

use crate::auth::Claims;

/// Number of days returned by the forecast endpoint
pub const FORECAST_DAYS: i64 = 5;

/// Lowest generated temperature in °C (inclusive)
pub const MIN_TEMPERATURE_C: i32 = -20;

/// Highest generated temperature in °C (exclusive)
pub const MAX_TEMPERATURE_C: i32 = 55;

pub const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: Option<String>,
}

impl WeatherForecast {
    pub fn new(date: NaiveDate, temperature_c: i32, summary: Option<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary,
        }
    }
}

/// Approximate Celsius to Fahrenheit conversion, truncating toward zero.
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (f64::from(celsius) / 0.5556) as i32
}

/// Generate forecasts for the days following `today`.
pub fn generate<R: Rng>(rng: &mut R, today: NaiveDate) -> Vec<WeatherForecast> {
    (1..=FORECAST_DAYS)
        .map(|offset| {
            WeatherForecast::new(
                today + Duration::days(offset),
                rng.gen_range(MIN_TEMPERATURE_C..MAX_TEMPERATURE_C),
                Some(SUMMARIES[rng.gen_range(0..SUMMARIES.len())].to_string()),
            )
        })
        .collect()
}

/// Forecast handler; requires a bearer token (see `require_bearer`).
pub async fn list(Extension(claims): Extension<Claims>) -> Json<Vec<WeatherForecast>> {
    tracing::debug!(subject = %claims.sub, "Generating forecast");
    let today = Local::now().date_naive();
    Json(generate(&mut rand::thread_rng(), today))
}
