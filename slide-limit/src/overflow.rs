use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;

/// What a [`Limiter`](crate::Limiter) does with an attempt that arrives while
/// the window is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Overflow {
    /// Count the attempt as dropped and report it as not admitted.
    #[default]
    Drop,
    /// Count the attempt as errored and fail with
    /// [`Error::RateLimitExceeded`].
    Error,
}

impl Overflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Overflow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "error" => Ok(Self::Error),
            "queue" => Err(Error::InvalidConfiguration(
                "`queue` is not an overflow strategy; submit tasks to a DeferredQueue instead"
                    .to_string(),
            )),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown overflow strategy `{other}`, expected `drop` or `error`"
            ))),
        }
    }
}

impl TryFrom<String> for Overflow {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        value.parse()
    }
}

impl From<Overflow> for String {
    fn from(value: Overflow) -> Self {
        value.as_str().to_string()
    }
}
