//! NETCONF 1.0 message construction and reply parsing.
//!
//! Only the handful of Junos RPCs needed to stage, inspect and commit
//! candidate configuration are covered.

use regex_lite::Regex;

use crate::models::DataFormat;

/// End-of-message marker for NETCONF 1.0 framing
pub const DELIMITER: &[u8] = b"]]>]]>";

pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// Client <hello>, sent once after the server's hello is read
pub fn client_hello() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{}"><capabilities><capability>{}</capability></capabilities></hello>"#,
        BASE_1_0, BASE_1_0
    )
}

/// Wrap an operation in an <rpc> envelope with its message-id
pub fn wrap_rpc(message_id: u64, operation: &str) -> String {
    format!(
        r#"<rpc xmlns="{}" message-id="{}">{}</rpc>"#,
        BASE_1_0, message_id, operation
    )
}

pub fn lock_candidate() -> String {
    "<lock><target><candidate/></target></lock>".to_string()
}

pub fn unlock_candidate() -> String {
    "<unlock><target><candidate/></target></unlock>".to_string()
}

pub fn discard_changes() -> String {
    "<discard-changes/>".to_string()
}

pub fn close_session() -> String {
    "<close-session/>".to_string()
}

/// Candidate vs. active configuration, as `show | compare` text
pub fn compare_rollback() -> String {
    r#"<get-configuration compare="rollback" rollback="0" format="text"/>"#.to_string()
}

pub fn commit(comment: Option<&str>) -> String {
    match comment {
        Some(c) if !c.is_empty() => format!(
            "<commit-configuration><log>{}</log></commit-configuration>",
            escape_xml(c)
        ),
        _ => "<commit-configuration/>".to_string(),
    }
}

/// Load rendered configuration into the candidate.
/// `set` and `text` payloads are escaped; `xml` is embedded as-is.
pub fn load_configuration(format: DataFormat, config: &str) -> String {
    match format {
        DataFormat::Set => format!(
            r#"<load-configuration action="set" format="text"><configuration-set>{}</configuration-set></load-configuration>"#,
            escape_xml(config)
        ),
        DataFormat::Text => format!(
            r#"<load-configuration action="merge" format="text"><configuration-text>{}</configuration-text></load-configuration>"#,
            escape_xml(config)
        ),
        DataFormat::Xml => format!(
            r#"<load-configuration action="merge" format="xml">{}</load-configuration>"#,
            config.trim()
        ),
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Split the first complete message off the front of `buf`.
/// Returns None until the end-of-message marker has arrived.
pub fn extract_message(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf
        .windows(DELIMITER.len())
        .position(|w| w == DELIMITER)?;
    let message: Vec<u8> = buf.drain(..pos + DELIMITER.len()).take(pos).collect();
    Some(String::from_utf8_lossy(&message).trim().to_string())
}

/// Text content of the first `<tag>` element, with any namespace prefix
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(
        r"(?s)<(?:[\w-]+:)?{tag}(?:\s[^>]*)?>(.*?)</(?:[\w-]+:)?{tag}>",
        tag = tag
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()))
}

/// Server <hello> contents
#[derive(Debug, Clone, Default)]
pub struct Hello {
    pub session_id: Option<u64>,
    pub capabilities: Vec<String>,
}

pub fn parse_hello(xml: &str) -> Hello {
    let capabilities: Vec<String> = Regex::new(r"(?s)<(?:[\w-]+:)?capability>(.*?)</(?:[\w-]+:)?capability>")
        .map(|re| {
            re.captures_iter(xml)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    Hello {
        session_id: element_text(xml, "session-id").and_then(|s| s.trim().parse().ok()),
        capabilities,
    }
}

/// An <rpc-error> returned by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub severity: String,
    pub tag: Option<String>,
    pub path: Option<String>,
    pub message: String,
}

impl RpcError {
    pub fn is_warning(&self) -> bool {
        self.severity.eq_ignore_ascii_case("warning")
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc {}: {}", self.severity, self.message)?;
        if let Some(tag) = &self.tag {
            write!(f, " [{}]", tag)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (at {})", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

/// A raw <rpc-reply>
#[derive(Debug, Clone)]
pub struct RpcReply {
    raw: String,
}

impl RpcReply {
    pub fn new(raw: String) -> Self {
        Self { raw }
    }

    pub fn errors(&self) -> Vec<RpcError> {
        let Ok(re) = Regex::new(r"(?s)<(?:[\w-]+:)?rpc-error(?:\s[^>]*)?>(.*?)</(?:[\w-]+:)?rpc-error>")
        else {
            return Vec::new();
        };

        re.captures_iter(&self.raw)
            .filter_map(|c| c.get(1))
            .map(|m| {
                let body = m.as_str();
                let text = |tag: &str| {
                    element_text(body, tag)
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                };
                RpcError {
                    // A missing severity is treated as fatal
                    severity: text("error-severity").unwrap_or_else(|| "error".to_string()),
                    tag: text("error-tag"),
                    path: text("error-path"),
                    message: text("error-message").unwrap_or_else(|| "unknown error".to_string()),
                }
            })
            .collect()
    }

    /// Fail on the first non-warning error; warnings are logged
    pub fn check(self) -> Result<Self, RpcError> {
        for err in self.errors() {
            if err.is_warning() {
                tracing::warn!("{}", err);
            } else {
                return Err(err);
            }
        }
        Ok(self)
    }

    /// The text of <configuration-output>, or None when it is empty
    pub fn configuration_output(&self) -> Option<String> {
        element_text(&self.raw, "configuration-output")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
