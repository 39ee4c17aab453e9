//! HTTP clients for the weather provider and the two ad platforms.
//!
//! Each client is a thin `reqwest` wrapper behind an `async_trait` port so
//! the engine can be exercised against fakes. Retrying and rate limiting
//! are NOT done here; the engine wraps every call through the limiter.

mod error;
mod google;
mod meta;
mod weather;

pub use error::ClientError;
pub use google::{GoogleAdsApi, GoogleAdsClient, GoogleCampaignStatus};
pub use meta::{AdSetDetails, MetaAdsApi, MetaAdsClient, MetaStatus};
pub use weather::{OpenWeatherClient, WeatherApi};
