//! Synthetic forecast generation.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

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

/// Days of forecast returned per request, starting tomorrow.
pub const FORECAST_DAYS: u64 = 5;

/// Lower bound inclusive, upper bound exclusive.
pub const MIN_TEMPERATURE_C: i32 = -20;
pub const MAX_TEMPERATURE_C: i32 = 55;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: String,
}

impl WeatherForecast {
    pub fn new(date: NaiveDate, temperature_c: i32, summary: impl Into<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary: summary.into(),
        }
    }
}

/// Truncating conversion using the 0.5556 approximation of 5/9.
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (celsius as f64 / 0.5556) as i32
}

/// One forecast per day for the `days` days after `today`.
pub fn generate(rng: &mut fastrand::Rng, today: NaiveDate, days: u64) -> Vec<WeatherForecast> {
    (1..=days)
        .filter_map(|offset| {
            let date = today.checked_add_days(Days::new(offset))?;
            let temperature_c = rng.i32(MIN_TEMPERATURE_C..MAX_TEMPERATURE_C);
            let summary = SUMMARIES[rng.usize(..SUMMARIES.len())];
            Some(WeatherForecast::new(date, temperature_c, summary))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 27).unwrap()
    }

    #[test]
    fn test_fahrenheit_truncates() {
        assert_eq!(fahrenheit(0), 32);
        assert_eq!(fahrenheit(100), 211);
        assert_eq!(fahrenheit(-20), -3);
        assert_eq!(fahrenheit(25), 76);
    }

    #[test]
    fn test_generates_consecutive_days_from_tomorrow() {
        let mut rng = fastrand::Rng::with_seed(7);
        let forecasts = generate(&mut rng, today(), FORECAST_DAYS);

        assert_eq!(forecasts.len(), 5);
        assert_eq!(forecasts[0].date, NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(forecasts[4].date, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        for f in &forecasts {
            assert!((MIN_TEMPERATURE_C..MAX_TEMPERATURE_C).contains(&f.temperature_c));
            assert_eq!(f.temperature_f, fahrenheit(f.temperature_c));
            assert!(SUMMARIES.contains(&f.summary.as_str()));
        }
    }

    #[test]
    fn test_same_seed_same_forecasts() {
        let a = generate(&mut fastrand::Rng::with_seed(42), today(), 5);
        let b = generate(&mut fastrand::Rng::with_seed(42), today(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_serializes_camel_case() {
        let forecast = WeatherForecast::new(today(), 10, "Mild");
        let json = serde_json::to_value(&forecast).unwrap();
        assert_eq!(json["date"], "2024-02-27");
        assert_eq!(json["temperatureC"], 10);
        assert_eq!(json["temperatureF"], 49);
        assert_eq!(json["summary"], "Mild");
    }
}
