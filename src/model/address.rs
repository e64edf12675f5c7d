//! Address list parsing for ActiveSync `From`/`To`/`Cc`/`ReplyTo` values.

use serde::{Deserialize, Serialize};

/// A mailbox with an optional display name.
///
/// - `"Ann Example <ann@example.com>"` → name `Ann Example`
/// - `"ann@example.com"` → no name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPair {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
}

impl AddressPair {
    /// Parse one mailbox. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let (Some(open), Some(close)) = (raw.rfind('<'), raw.rfind('>')) {
            if close > open {
                let address = raw[open + 1..close].trim().to_string();
                let name = unquote(&raw[..open]);
                return Some(Self {
                    name: (!name.is_empty()).then_some(name),
                    address,
                });
            }
        }

        Some(Self {
            name: None,
            address: raw.to_string(),
        })
    }

    /// Parse a comma separated list, honoring quoted display names.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut quoted = false;
        let mut bracketed = false;

        for (i, ch) in raw.char_indices() {
            match ch {
                '"' => quoted = !quoted,
                '<' if !quoted => bracketed = true,
                '>' if !quoted => bracketed = false,
                ',' | ';' if !quoted && !bracketed => {
                    out.extend(Self::parse(&raw[start..i]));
                    start = i + ch.len_utf8();
                }
                _ => {}
            }
        }
        out.extend(Self::parse(&raw[start..]));
        out.retain(|a| !a.address.is_empty());
        out
    }
}

impl std::fmt::Display for AddressPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
        .to_string()
}
