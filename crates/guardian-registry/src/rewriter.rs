//! In-place update of the selected-server fields.
//!
//! Only the value bytes of `current_stock` / `current_trade_stock` inside the
//! `QuoterServers` start tag change; every other byte of the document is
//! preserved.

use std::io::Write;
use std::ops::Range;
use std::path::Path;

use guardian_core::{SelectionResult, ServerRole};
use quick_xml::escape::escape;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::document::{scan_text, ServerDocument};
use crate::error::{RegistryError, RegistryResult};

/// What [`ConfigRewriter::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Neither role resolved; the file was not touched.
    Unchanged,
    /// The file was rewritten; flags tell which fields changed.
    Rewritten {
        market_data: bool,
        order_routing: bool,
    },
}

/// Span of one attribute inside a start tag, relative to the tag start.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSpan {
    name: String,
    value: Range<usize>,
}

/// Locate every attribute value inside a raw start tag (`<Name a="1" b='2'>`).
fn attribute_spans(tag: &str) -> RegistryResult<Vec<AttributeSpan>> {
    let bytes = tag.as_bytes();
    let malformed = |what: &str| RegistryError::RewriteFailed(format!("malformed start tag: {}", what));

    if bytes.first() != Some(&b'<') {
        return Err(malformed("missing '<'"));
    }
    let mut i = 1;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }

    let mut spans = Vec::new();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(malformed("unterminated tag")),
            Some(b'>') | Some(b'/') => break,
            Some(_) => {}
        }

        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name = &tag[name_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            return Err(malformed("attribute without value"));
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let quote = match bytes.get(i) {
            Some(q @ (b'"' | b'\'')) => *q,
            _ => return Err(malformed("unquoted attribute value")),
        };
        i += 1;
        let value_start = i;
        while i < bytes.len() && bytes[i] != quote {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(malformed("unterminated attribute value"));
        }
        spans.push(AttributeSpan {
            name: name.to_string(),
            value: value_start..i,
        });
        i += 1;
    }

    Ok(spans)
}

/// Replace the last two `_`-separated components of a raw field value.
fn replace_address(raw: &str, address: &str, port: u16) -> RegistryResult<String> {
    let parts: Vec<&str> = raw.split('_').collect();
    if parts.len() < 2 {
        return Err(RegistryError::RewriteFailed(format!(
            "selected-server field '{}' has fewer than two components",
            raw
        )));
    }
    let keep = &parts[..parts.len() - 2];
    let address = escape(address);
    let port = port.to_string();
    let mut out: Vec<&str> = keep.to_vec();
    out.push(&address);
    out.push(&port);
    Ok(out.join("_"))
}

/// Writes a [`SelectionResult`] into the server document.
pub struct ConfigRewriter;

impl ConfigRewriter {
    /// Rewrite the document text for `selection`.
    ///
    /// Both selected-server fields must exist. Fields for unresolved roles
    /// keep their previous value.
    pub fn rewrite_text(text: &str, selection: &SelectionResult) -> RegistryResult<String> {
        let scan = scan_text(text).map_err(|e| RegistryError::RewriteFailed(e.to_string()))?;
        let tag_start = scan.root_span.start;
        let spans = attribute_spans(&text[scan.root_span.clone()])?;

        // Absolute value ranges per role, in document order for splicing.
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        for role in ServerRole::ALL {
            let field = role.selected_field();
            let span = spans.iter().find(|s| s.name == field).ok_or_else(|| {
                RegistryError::RewriteFailed(format!("missing attribute '{}'", field))
            })?;
            let Some(measurement) = selection.for_role(role) else {
                continue;
            };
            let range = tag_start + span.value.start..tag_start + span.value.end;
            let replacement = replace_address(
                &text[range.clone()],
                &measurement.endpoint.address,
                measurement.endpoint.port,
            )?;
            edits.push((range, replacement));
        }

        edits.sort_by_key(|(range, _)| range.start);
        let mut out = String::with_capacity(text.len() + 32);
        let mut cursor = 0;
        for (range, replacement) in edits {
            out.push_str(&text[cursor..range.start]);
            out.push_str(&replacement);
            cursor = range.end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    /// Rewrite the document at `path` atomically.
    ///
    /// Nothing is written when neither role resolved.
    pub fn apply(path: &Path, selection: &SelectionResult) -> RegistryResult<RewriteOutcome> {
        let document = ServerDocument::load(path)
            .map_err(|e| RegistryError::RewriteFailed(e.to_string()))?;
        let rewritten = Self::rewrite_text(document.text(), selection)?;

        if selection.is_empty() {
            warn!(path = %path.display(), "No server selected for any role, document left unchanged");
            return Ok(RewriteOutcome::Unchanged);
        }

        write_atomic(path, rewritten.as_bytes())?;

        let outcome = RewriteOutcome::Rewritten {
            market_data: selection.market_data.is_some(),
            order_routing: selection.order_routing.is_some(),
        };
        info!(
            path = %path.display(),
            market_data = ?selection.market_data.as_ref().map(|m| m.endpoint.socket_label()),
            order_routing = ?selection.order_routing.as_ref().map(|m| m.endpoint.socket_label()),
            "Server document rewritten"
        );
        Ok(outcome)
    }
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> RegistryResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let fail = |e: std::io::Error| {
        RegistryError::RewriteFailed(format!("{}: {}", path.display(), e))
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(contents).map_err(fail)?;
    // The temp file starts out private; keep the original file's mode.
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(fail)?;
    }
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::{Endpoint, Latency, Measurement};
    use std::time::Duration;

    const DOC: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<Root>\r\n  <QuoterServers  current_stock = \"行情_主站_10.0.0.1_55300\" flag='x' current_trade_stock='交易_10.0.0.9_55310' >\r\n    <QuoterServer quotertype=\"0\" address=\"10.0.0.2\" port=\"55301\" servername=\"VIP-2\"/>\r\n  </QuoterServers>\r\n</Root>\r\n";

    fn measurement(address: &str, port: u16, role: ServerRole) -> Measurement {
        Measurement::new(
            Endpoint::new(address, port, role, "x"),
            vec![],
            Latency::Finite(Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_attribute_spans() {
        let tag = r#"<QuoterServers a="1" b = '22' c="">"#;
        let spans = attribute_spans(tag).unwrap();
        let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(&tag[spans[1].value.clone()], "22");
        assert_eq!(&tag[spans[2].value.clone()], "");
    }

    #[test]
    fn test_rewrite_both_preserves_other_bytes() {
        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: Some(measurement("10.2.2.2", 7000, ServerRole::OrderRouting)),
        };
        let out = ConfigRewriter::rewrite_text(DOC, &selection).unwrap();
        let expected = DOC
            .replace("行情_主站_10.0.0.1_55300", "行情_主站_10.1.1.1_6000")
            .replace("交易_10.0.0.9_55310", "交易_10.2.2.2_7000");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_half_selection_rewrites_one_field() {
        let selection = SelectionResult {
            market_data: None,
            order_routing: Some(measurement("10.2.2.2", 7000, ServerRole::OrderRouting)),
        };
        let out = ConfigRewriter::rewrite_text(DOC, &selection).unwrap();
        assert!(out.contains("行情_主站_10.0.0.1_55300"));
        assert!(out.contains("交易_10.2.2.2_7000"));
    }

    #[test]
    fn test_rewrite_round_trip_reads_back() {
        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: None,
        };
        let out = ConfigRewriter::rewrite_text(DOC, &selection).unwrap();
        let current = ServerDocument::from_text(out).current_selection().unwrap();
        assert_eq!(current.market_data.unwrap().address, "10.1.1.1");
        assert_eq!(current.order_routing.unwrap().address, "10.0.0.9");
    }

    #[test]
    fn test_missing_field_fails() {
        let doc = r#"<QuoterServers current_stock="a_1.1.1.1_1"></QuoterServers>"#;
        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: None,
        };
        assert!(matches!(
            ConfigRewriter::rewrite_text(doc, &selection),
            Err(RegistryError::RewriteFailed(_))
        ));
    }

    #[test]
    fn test_apply_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtquoterconfig.xml");
        std::fs::write(&path, DOC).unwrap();

        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: Some(measurement("10.2.2.2", 7000, ServerRole::OrderRouting)),
        };
        let outcome = ConfigRewriter::apply(&path, &selection).unwrap();
        assert_eq!(
            outcome,
            RewriteOutcome::Rewritten {
                market_data: true,
                order_routing: true
            }
        );
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("交易_10.2.2.2_7000"));
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtquoterconfig.xml");
        std::fs::write(&path, DOC).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: None,
        };
        ConfigRewriter::apply(&path, &selection).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_apply_empty_selection_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtquoterconfig.xml");
        std::fs::write(&path, DOC).unwrap();

        let outcome = ConfigRewriter::apply(&path, &SelectionResult::default()).unwrap();
        assert_eq!(outcome, RewriteOutcome::Unchanged);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DOC);
    }

    #[test]
    fn test_apply_missing_file_fails_without_creating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.xml");
        let selection = SelectionResult {
            market_data: Some(measurement("10.1.1.1", 6000, ServerRole::MarketData)),
            order_routing: None,
        };
        assert!(ConfigRewriter::apply(&path, &selection).is_err());
        assert!(!path.exists());
    }
}
