//! The terminal's server document.
//!
//! ```xml
//! <QuoterServers current_stock="..._10.0.0.1_55300" current_trade_stock="..._10.0.0.2_55310">
//!     <QuoterServer quotertype="0" address="10.0.0.1" port="55300" servername="VIP-1" .../>
//! </QuoterServers>
//! ```

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use guardian_core::ServerRole;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};

/// Element carrying the selected-server fields.
pub const ROOT_ELEMENT: &str = "QuoterServers";
/// One candidate server.
pub const SERVER_ELEMENT: &str = "QuoterServer";

/// Unescaped attributes of one element, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementAttributes {
    values: HashMap<String, String>,
}

impl ElementAttributes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn from_tag(tag: &BytesStart<'_>) -> RegistryResult<Self> {
        let mut values = HashMap::new();
        for attr in tag.attributes() {
            let attr = attr.map_err(|e| RegistryError::CatalogMalformed(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| RegistryError::CatalogMalformed(e.to_string()))?;
            values.insert(key, value.into_owned());
        }
        Ok(Self { values })
    }
}

/// Result of one pass over the document.
#[derive(Debug, Clone)]
pub(crate) struct DocumentScan {
    /// Byte range of the `QuoterServers` start tag, `<` through `>`.
    pub root_span: Range<usize>,
    pub root: ElementAttributes,
    pub servers: Vec<ElementAttributes>,
}

/// A server chosen in the document's selected-server fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedServer {
    pub address: String,
    pub port: u16,
}

/// Selected servers read back from the document. A missing or unparseable
/// field yields `None` for that role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSelection {
    pub market_data: Option<SelectedServer>,
    pub order_routing: Option<SelectedServer>,
}

impl CurrentSelection {
    pub fn for_role(&self, role: ServerRole) -> Option<&SelectedServer> {
        match role {
            ServerRole::MarketData => self.market_data.as_ref(),
            ServerRole::OrderRouting => self.order_routing.as_ref(),
        }
    }
}

/// Split a selected-server field into `(address, port)`.
///
/// The field is `_`-separated; the last two components are the address and
/// the port.
pub fn split_selected_field(value: &str) -> Option<SelectedServer> {
    let mut parts = value.rsplit('_');
    let port = parts.next()?.trim().parse::<u16>().ok()?;
    let address = parts.next()?.trim();
    if address.is_empty() {
        return None;
    }
    Some(SelectedServer {
        address: address.to_string(),
        port,
    })
}

/// In-memory copy of the server document.
#[derive(Debug, Clone)]
pub struct ServerDocument {
    path: Option<PathBuf>,
    text: String,
}

impl ServerDocument {
    /// Read the document from disk.
    pub fn load(path: &Path) -> RegistryResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RegistryError::CatalogUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let text = String::from_utf8(bytes).map_err(|_| {
            RegistryError::CatalogMalformed(format!("{}: not valid UTF-8", path.display()))
        })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            text,
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            path: None,
            text: text.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn scan(&self) -> RegistryResult<DocumentScan> {
        scan_text(&self.text)
    }

    /// Candidate server elements, unescaped.
    pub fn server_entries(&self) -> RegistryResult<Vec<ElementAttributes>> {
        Ok(self.scan()?.servers)
    }

    /// Selected servers per role, read from the document.
    pub fn current_selection(&self) -> RegistryResult<CurrentSelection> {
        let scan = self.scan()?;
        let mut selection = CurrentSelection::default();
        for role in ServerRole::ALL {
            let field = role.selected_field();
            let parsed = match scan.root.get(field) {
                Some(value) => {
                    let parsed = split_selected_field(value);
                    if parsed.is_none() {
                        warn!(field, value, "Unparseable selected-server field");
                    }
                    parsed
                }
                None => None,
            };
            match role {
                ServerRole::MarketData => selection.market_data = parsed,
                ServerRole::OrderRouting => selection.order_routing = parsed,
            }
        }
        Ok(selection)
    }
}

pub(crate) fn scan_text(text: &str) -> RegistryResult<DocumentScan> {
    let mut reader = Reader::from_str(text);
    let mut root: Option<(Range<usize>, ElementAttributes)> = None;
    let mut servers = Vec::new();
    let mut inside_root = false;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| RegistryError::CatalogMalformed(format!("at byte {}: {}", start, e)))?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(ref tag) | Event::Empty(ref tag) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = tag.name();
                if name.as_ref() == ROOT_ELEMENT.as_bytes() {
                    if root.is_none() {
                        root = Some((start..end, ElementAttributes::from_tag(tag)?));
                        inside_root = !is_empty;
                    }
                } else if inside_root && name.as_ref() == SERVER_ELEMENT.as_bytes() {
                    servers.push(ElementAttributes::from_tag(tag)?);
                }
            }
            Event::End(ref tag) => {
                if tag.name().as_ref() == ROOT_ELEMENT.as_bytes() {
                    inside_root = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let (root_span, root) = root.ok_or_else(|| {
        RegistryError::CatalogMalformed(format!("missing <{}> element", ROOT_ELEMENT))
    })?;

    Ok(DocumentScan {
        root_span,
        root,
        servers,
    })
}
