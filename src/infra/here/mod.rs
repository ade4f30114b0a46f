//! HERE reverse-geocoding implementation of
//! [`SpeedLimitLookup`](crate::services::speed_limit::SpeedLimitLookup).

mod client;

pub use client::{HERE_API_KEY_ENV, HereSpeedLimitClient};
