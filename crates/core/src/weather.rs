//! Weather snapshot shape shared between the weather client and the
//! condition evaluator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation for a rule's location.
///
/// Units: temperature °C, wind m/s, precipitation mm/h, visibility km,
/// cloud cover %. Fields the provider did not report are `None`; a
/// condition on a missing parameter evaluates to false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<f64>,
    pub visibility: Option<f64>,
    pub cloud_cover: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub condition_id: i64,
    pub observed_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Empty snapshot stamped now; fields are filled by the client mapping.
    pub fn empty() -> Self {
        Self {
            temperature: None,
            humidity: None,
            wind_speed: None,
            precipitation: None,
            visibility: None,
            cloud_cover: None,
            description: String::new(),
            icon: String::new(),
            condition_id: 0,
            observed_at: Utc::now(),
        }
    }
}

/// Weather parameters a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherParameter {
    Temperature,
    Humidity,
    WindSpeed,
    Precipitation,
    Visibility,
    CloudCover,
}

impl WeatherParameter {
    /// Numeric value of this parameter in a snapshot, if reported.
    pub fn value_in(&self, snapshot: &WeatherSnapshot) -> Option<f64> {
        match self {
            WeatherParameter::Temperature => snapshot.temperature,
            WeatherParameter::Humidity => snapshot.humidity,
            WeatherParameter::WindSpeed => snapshot.wind_speed,
            WeatherParameter::Precipitation => snapshot.precipitation,
            WeatherParameter::Visibility => snapshot.visibility,
            WeatherParameter::CloudCover => snapshot.cloud_cover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_in_picks_the_right_field() {
        let snap = WeatherSnapshot {
            temperature: Some(31.0),
            humidity: Some(60.0),
            wind_speed: Some(4.2),
            precipitation: Some(0.0),
            visibility: None,
            cloud_cover: Some(75.0),
            ..WeatherSnapshot::empty()
        };
        assert_eq!(WeatherParameter::Temperature.value_in(&snap), Some(31.0));
        assert_eq!(WeatherParameter::CloudCover.value_in(&snap), Some(75.0));
        assert_eq!(WeatherParameter::Visibility.value_in(&snap), None);
    }

    #[test]
    fn parameter_serde_names_are_snake_case() {
        let json = serde_json::to_string(&WeatherParameter::WindSpeed).unwrap();
        assert_eq!(json, "\"wind_speed\"");
        let back: WeatherParameter = serde_json::from_str("\"cloud_cover\"").unwrap();
        assert_eq!(back, WeatherParameter::CloudCover);
    }
}
