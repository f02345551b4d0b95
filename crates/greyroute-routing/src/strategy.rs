//! Grey strategy documents and resolution
//!
//! An [`AppStrategy`] is one immutable snapshot of the grey configuration:
//!
//! ```json
//! {
//!   "version": 3,
//!   "enable": true,
//!   "host": "grey.app-server.com",
//!   "port": 8080,
//!   "apis": {
//!     "online-json-direct": {
//!       "enable": true,
//!       "port": 8081,
//!       "rules": [
//!         { "version": { "type": "in", "args": ["v1"] } },
//!         { "insCode": { "type": "pattern", "args": ["^INS0002.*"] } }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Resolution walks the guards in order (app enabled, API known, app-level
//! host/port configured, API enabled with rules) and returns grey on the first
//! matching rule. API-level `host` and `port` override the app-level values
//! independently of each other.

use greyroute_core::{ApiIdentify, Dimensions, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::rule::Rule;

/// Deserialize `null` as the type's default, like a missing field
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize a port, treating `null` and out-of-range integers as unset
///
/// A bad port in one entry must not reject the whole document.
pub(crate) fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(port) = Option::<i64>::deserialize(deserializer)? else {
        return Ok(0);
    };
    Ok(u16::try_from(port).unwrap_or_else(|_| {
        tracing::warn!("Ignoring out-of-range grey port {}", port);
        0
    }))
}

/// Outcome of classifying one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GreyDecision {
    /// Whether the request is grey traffic
    pub is_grey: bool,
    /// Target host (empty unless `is_grey`)
    pub host: String,
    /// Target port (zero unless `is_grey`)
    pub port: u16,
}

impl GreyDecision {
    /// The negative decision: `(false, "", 0)`
    pub fn not_grey() -> Self {
        Self::default()
    }

    pub fn grey(host: impl Into<String>, port: u16) -> Self {
        Self {
            is_grey: true,
            host: host.into(),
            port,
        }
    }

    /// `host:port` to forward to, only for grey decisions
    pub fn authority(&self) -> Option<String> {
        self.is_grey.then(|| format!("{}:{}", self.host, self.port))
    }
}

/// Grey configuration for one business API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStrategy {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    /// Overrides the app-level host when non-empty
    #[serde(default, deserialize_with = "nullable")]
    pub host: String,
    /// Overrides the app-level port when non-zero
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: u16,
    #[serde(default, deserialize_with = "nullable")]
    pub enable: bool,
    /// Evaluated in declaration order; the first match wins
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Vec<Rule>,
}

impl ApiStrategy {
    /// First rule matching the dimensions, with its position
    pub fn first_match(&self, dimensions: &Dimensions) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(dimensions))
    }
}

/// Top-level grey strategy snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppStrategy {
    /// Strictly increases across accepted updates
    #[serde(default, deserialize_with = "nullable")]
    pub version: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub enable: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub host: String,
    #[serde(default, deserialize_with = "lenient_port")]
    pub port: u16,
    #[serde(default, deserialize_with = "nullable")]
    pub apis: HashMap<ApiIdentify, ApiStrategy>,
}

impl AppStrategy {
    /// Parse a raw strategy document
    ///
    /// Unknown fields are ignored and missing ones take their defaults.
    ///
    /// # Errors
    /// - `Error::Parse` if the document is not valid JSON or has mistyped fields
    pub fn from_json(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    /// Effective grey target for `api`, if the guards allow grey routing at all
    ///
    /// Returns `None` when the strategy is disabled, the API is unknown, or
    /// the app-level host/port are not configured.
    pub fn target_for(&self, api: &ApiIdentify) -> Option<(&str, u16)> {
        self.guarded(api).map(|(_, host, port)| (host, port))
    }

    fn guarded(&self, api: &ApiIdentify) -> Option<(&ApiStrategy, &str, u16)> {
        if !self.enable {
            return None;
        }
        let api_strategy = self.apis.get(api)?;
        if self.host.is_empty() || self.port == 0 {
            return None;
        }

        let host = if api_strategy.host.is_empty() {
            self.host.as_str()
        } else {
            api_strategy.host.as_str()
        };
        let port = if api_strategy.port == 0 {
            self.port
        } else {
            api_strategy.port
        };
        Some((api_strategy, host, port))
    }

    /// Classify a request against this snapshot
    pub fn resolve(&self, api: &ApiIdentify, dimensions: &Dimensions) -> GreyDecision {
        let Some((api_strategy, host, port)) = self.guarded(api) else {
            return GreyDecision::not_grey();
        };
        if !api_strategy.enable || api_strategy.rules.is_empty() {
            return GreyDecision::not_grey();
        }

        match api_strategy.first_match(dimensions) {
            Some((index, _)) => {
                tracing::debug!(
                    "Grey rule #{} of '{}' matched (strategy v{}) → {}:{}",
                    index,
                    api,
                    self.version,
                    host,
                    port
                );
                GreyDecision::grey(host, port)
            }
            None => GreyDecision::not_grey(),
        }
    }
}
