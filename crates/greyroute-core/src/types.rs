//! Grey routing keys
//!
//! Both API identifiers and dimensions are open sets: the well-known values
//! below are conveniences, any other string works the same way.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// Observed request attributes, keyed by dimension.
pub type Dimensions = HashMap<Dimension, String>;

/// Business API identifier (e.g. `online-json-direct`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiIdentify(String);

impl ApiIdentify {
    /// Online JSON business, direct connection
    pub const ONLINE_JSON_DIRECT: &'static str = "online-json-direct";
    /// Online JSON business, indirect connection
    pub const ONLINE_JSON_INDIRECT: &'static str = "online-json-indirect";

    pub fn new(identify: impl Into<String>) -> Self {
        Self(identify.into())
    }

    pub fn online_json_direct() -> Self {
        Self::new(Self::ONLINE_JSON_DIRECT)
    }

    pub fn online_json_indirect() -> Self {
        Self::new(Self::ONLINE_JSON_INDIRECT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiIdentify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApiIdentify {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ApiIdentify {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ApiIdentify {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Name of a request attribute used as matching input
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(String);

impl Dimension {
    pub const VERSION: &'static str = "version";
    pub const STORE_ID: &'static str = "storeId";
    pub const INS_CODE: &'static str = "insCode";
    pub const TERMINAL_ID: &'static str = "terminalId";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn version() -> Self {
        Self::new(Self::VERSION)
    }

    pub fn store_id() -> Self {
        Self::new(Self::STORE_ID)
    }

    pub fn ins_code() -> Self {
        Self::new(Self::INS_CODE)
    }

    pub fn terminal_id() -> Self {
        Self::new(Self::TERMINAL_ID)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dimension {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Dimension {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for Dimension {
    fn borrow(&self) -> &str {
        &self.0
    }
}
