//! Candidate server list from the server document.

use std::collections::HashMap;
use std::path::Path;

use guardian_core::{Endpoint, ServerRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{ElementAttributes, ServerDocument};
use crate::error::{RegistryError, RegistryResult};

/// Filtering applied while reading the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPolicy {
    /// Keep only premium market-data servers. Order-routing servers are
    /// never tier-filtered.
    #[serde(default)]
    pub premium_only: bool,
}

/// Reads candidate endpoints out of a [`ServerDocument`].
pub struct ServerCatalog;

impl ServerCatalog {
    /// Load and parse the document at `path`.
    pub fn load(path: &Path, policy: CatalogPolicy) -> RegistryResult<Vec<Endpoint>> {
        let document = ServerDocument::load(path)?;
        Self::parse(&document, policy)
    }

    /// Parse candidate endpoints.
    ///
    /// Entries sharing `(role, address)` collapse to the last one, kept at
    /// the position where the address first appeared. Unknown server types
    /// are skipped.
    pub fn parse(document: &ServerDocument, policy: CatalogPolicy) -> RegistryResult<Vec<Endpoint>> {
        let entries = document.server_entries()?;

        let mut endpoints: Vec<Endpoint> = Vec::with_capacity(entries.len());
        let mut index: HashMap<(ServerRole, String), usize> = HashMap::new();
        let mut filtered = 0usize;

        for (position, entry) in entries.iter().enumerate() {
            let Some(endpoint) = Self::endpoint_from_entry(position, entry)? else {
                continue;
            };

            if policy.premium_only && endpoint.role == ServerRole::MarketData && !endpoint.premium {
                filtered += 1;
                continue;
            }

            let key = (endpoint.role, endpoint.address.clone());
            match index.get(&key) {
                Some(&slot) => {
                    debug!(
                        role = %endpoint.role,
                        address = %endpoint.address,
                        "Duplicate server address, keeping last entry"
                    );
                    endpoints[slot] = endpoint;
                }
                None => {
                    index.insert(key, endpoints.len());
                    endpoints.push(endpoint);
                }
            }
        }

        let market_data = endpoints
            .iter()
            .filter(|e| e.role == ServerRole::MarketData)
            .count();
        info!(
            market_data,
            order_routing = endpoints.len() - market_data,
            filtered,
            premium_only = policy.premium_only,
            "Server catalog parsed"
        );

        Ok(endpoints)
    }

    fn endpoint_from_entry(
        position: usize,
        entry: &ElementAttributes,
    ) -> RegistryResult<Option<Endpoint>> {
        let required = |name: &str| {
            entry.get(name).ok_or_else(|| {
                RegistryError::CatalogMalformed(format!(
                    "server entry #{} missing attribute '{}'",
                    position, name
                ))
            })
        };

        let quoter_type = required("quotertype")?;
        let address = required("address")?;
        let port = required("port")?;
        let label = required("servername")?;

        let role = match ServerRole::from_quoter_type(quoter_type) {
            Ok(role) => role,
            Err(_) => {
                warn!(position, quoter_type, address, "Skipping server with unknown type");
                return Ok(None);
            }
        };

        let port = Endpoint::parse_port(port).map_err(|e| {
            RegistryError::CatalogMalformed(format!("server entry #{}: {}", position, e))
        })?;

        Ok(Some(Endpoint::new(address.trim(), port, role, label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(servers: &str) -> ServerDocument {
        ServerDocument::from_text(format!(
            r#"<Root><QuoterServers current_stock="a_1.1.1.1_1" current_trade_stock="b_2.2.2.2_2">{}</QuoterServers></Root>"#,
            servers
        ))
    }

    #[test]
    fn test_parse_roles_and_premium() {
        let document = doc(
            r#"<QuoterServer quotertype="0" address="10.0.0.1" port="55300" servername="VIP-SH"/>
               <QuoterServer quotertype="0" address="10.0.0.2" port="55300" servername="SH"/>
               <QuoterServer quotertype="1" address="10.0.1.1" port="55310" servername="Trade"/>"#,
        );

        let all = ServerCatalog::parse(&document, CatalogPolicy::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].premium);
        assert_eq!(all[2].role, ServerRole::OrderRouting);

        let premium = ServerCatalog::parse(&document, CatalogPolicy { premium_only: true }).unwrap();
        let addresses: Vec<_> = premium.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.1.1"]);
    }

    #[test]
    fn test_duplicate_address_last_wins_first_position() {
        let document = doc(
            r#"<QuoterServer quotertype="0" address="10.0.0.1" port="1" servername="first"/>
               <QuoterServer quotertype="0" address="10.0.0.2" port="2" servername="other"/>
               <QuoterServer quotertype="0" address="10.0.0.1" port="3" servername="last"/>
               <QuoterServer quotertype="1" address="10.0.0.1" port="4" servername="trade"/>"#,
        );

        let endpoints = ServerCatalog::parse(&document, CatalogPolicy::default()).unwrap();
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[0].label, "last");
        assert_eq!(endpoints[0].port, 3);
        assert_eq!(endpoints[1].label, "other");
        assert_eq!(endpoints[2].role, ServerRole::OrderRouting);
    }

    #[test]
    fn test_unknown_type_skipped() {
        let document = doc(
            r#"<QuoterServer quotertype="7" address="10.0.0.1" port="1" servername="x"/>
               <QuoterServer quotertype="1" address="10.0.0.2" port="2" servername="y"/>"#,
        );
        let endpoints = ServerCatalog::parse(&document, CatalogPolicy::default()).unwrap();
        assert_eq!(endpoints.len(), 1);
    }

    #[test]
    fn test_missing_attribute_is_malformed() {
        let document = doc(r#"<QuoterServer quotertype="0" port="1" servername="x"/>"#);
        let err = ServerCatalog::parse(&document, CatalogPolicy::default()).unwrap_err();
        assert!(matches!(err, RegistryError::CatalogMalformed(_)));
    }

    #[test]
    fn test_bad_port_is_malformed() {
        let document = doc(r#"<QuoterServer quotertype="0" address="a" port="x" servername="x"/>"#);
        assert!(matches!(
            ServerCatalog::parse(&document, CatalogPolicy::default()),
            Err(RegistryError::CatalogMalformed(_))
        ));
    }

    #[test]
    fn test_empty_catalog() {
        let endpoints = ServerCatalog::parse(&doc(""), CatalogPolicy::default()).unwrap();
        assert!(endpoints.is_empty());
    }
}
