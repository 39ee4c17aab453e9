//! Current-weather client (OpenWeather-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use vane_core::config::WeatherConfig;
use vane_core::WeatherSnapshot;

use crate::error::{api_error_from_response, ClientError};

/// Weather observations port.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, ClientError>;
}

pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherClient {
    /// Build from config. Errors when no API key is configured.
    pub fn from_config(config: &WeatherConfig) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("WEATHER_API_KEY".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

// Provider payload, metric units.
#[derive(Debug, Deserialize)]
struct CurrentWeatherBody {
    main: MainBody,
    #[serde(default)]
    wind: Option<WindBody>,
    #[serde(default)]
    clouds: Option<CloudsBody>,
    /// Meters; capped at 10 km by the provider.
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    rain: Option<PrecipBody>,
    #[serde(default)]
    snow: Option<PrecipBody>,
    #[serde(default)]
    weather: Vec<WeatherDescBody>,
}

#[derive(Debug, Deserialize)]
struct MainBody {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WindBody {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct CloudsBody {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct PrecipBody {
    #[serde(rename = "1h", default)]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WeatherDescBody {
    id: i64,
    description: String,
    icon: String,
}

impl CurrentWeatherBody {
    fn into_snapshot(self) -> WeatherSnapshot {
        let rain = self.rain.and_then(|p| p.one_hour).unwrap_or(0.0);
        let snow = self.snow.and_then(|p| p.one_hour).unwrap_or(0.0);
        let desc = self.weather.first();
        WeatherSnapshot {
            temperature: Some(self.main.temp),
            humidity: Some(self.main.humidity),
            wind_speed: self.wind.map(|w| w.speed),
            precipitation: Some(rain + snow),
            // Provider reports meters; the snapshot unit is km.
            visibility: self.visibility.map(|m| m / 1_000.0),
            cloud_cover: self.clouds.map(|c| c.all),
            description: desc.map(|w| w.description.clone()).unwrap_or_default(),
            icon: desc.map(|w| w.icon.clone()).unwrap_or_default(),
            condition_id: desc.map(|w| w.id).unwrap_or(0),
            observed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, ClientError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error_from_response(response).await);
        }

        let body: CurrentWeatherBody = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let snapshot = body.into_snapshot();
        debug!(lat, lon, temp = ?snapshot.temperature, "weather fetched");
        Ok(snapshot)
    }
}
