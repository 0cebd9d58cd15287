use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Limiter;
use crate::Overflow;

/// Serialisable settings for a [`Limiter`].
///
/// `window` accepts `humantime` strings such as `"90s"` or `"1m 30s"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    #[serde(default)]
    pub overflow: Overflow,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            window: Duration::from_secs(60),
            overflow: Overflow::Drop,
        }
    }
}

impl LimiterConfig {
    pub fn build(&self) -> Result<Limiter, Error> {
        Limiter::from_config(self)
    }
}
