//! Upstream server candidates.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker in a server's display name that identifies the premium tier.
pub const PREMIUM_MARKER: &str = "VIP";

/// Which terminal connection a server serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerRole {
    /// Quote feed (`quotertype="0"`).
    MarketData,
    /// Order routing (`quotertype="1"`).
    OrderRouting,
}

impl ServerRole {
    /// Both roles, in selection order.
    pub const ALL: [ServerRole; 2] = [ServerRole::MarketData, ServerRole::OrderRouting];

    /// Parse the document's `quotertype` attribute.
    pub fn from_quoter_type(raw: &str) -> Result<Self> {
        match raw.trim() {
            "0" => Ok(Self::MarketData),
            "1" => Ok(Self::OrderRouting),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }

    /// The document's `quotertype` value for this role.
    pub fn quoter_type(&self) -> &'static str {
        match self {
            Self::MarketData => "0",
            Self::OrderRouting => "1",
        }
    }

    /// Name of the "currently selected" attribute on `QuoterServers`.
    pub fn selected_field(&self) -> &'static str {
        match self {
            Self::MarketData => "current_stock",
            Self::OrderRouting => "current_trade_stock",
        }
    }

    /// Stable label for logs, metrics and alert keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "market-data",
            Self::OrderRouting => "order-routing",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate upstream server.
///
/// Identity within one role is the address. Immutable once created from the
/// server document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub role: ServerRole,
    /// Display name (`servername`).
    pub label: String,
    /// Premium tier flag, derived from the display name.
    pub premium: bool,
}

impl Endpoint {
    /// Create an endpoint; the premium flag is derived from the label.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        role: ServerRole,
        label: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let premium = label.contains(PREMIUM_MARKER);
        Self {
            address: address.into(),
            port,
            role,
            label,
            premium,
        }
    }

    /// Parse a port attribute.
    pub fn parse_port(raw: &str) -> Result<u16> {
        raw.trim()
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidPort(raw.to_string()))
    }

    /// `address:port`.
    pub fn socket_label(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} {}:{}", self.role, self.label, self.address, self.port)
    }
}
