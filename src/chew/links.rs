//! Link extraction and conferencing detection for event descriptions.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{ConferenceInfo, LinkInfo, LinkType};

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(?:https?|ftp|file)://|www\.|ftp\.)(?:\([\-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[\-A-Z0-9+\&@#/%=\~_|$?!:,.])*(?:\([\-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[A-Z0-9+\&@#/%=\~_|$])",
    )
    .expect("valid URL regex")
});

/// A hosted meeting service recognized by host suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferencingProvider {
    pub name: String,
    pub domain: String,
    pub icon: String,
}

impl ConferencingProvider {
    fn new(name: &str, domain: &str, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            icon: icon.to_string(),
        }
    }
}

/// Which links to drop and which hosts are meeting services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Exact URLs that carry no information (boilerplate help links).
    pub ignore: Vec<String>,
    pub conferencing: Vec<ConferencingProvider>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ignore: vec!["https://aka.ms/JoinTeamsMeeting".to_string()],
            conferencing: vec![
                ConferencingProvider::new("Zoom", "zoom.us", "zoom.png"),
                ConferencingProvider::new("Teams", "teams.microsoft.com", "teams.png"),
                ConferencingProvider::new("Meet", "meet.google.com", "meet.png"),
                ConferencingProvider::new("Jitsi", "meet.jit.si", "jitsi.png"),
                ConferencingProvider::new("GoToMeeting", ".gotomeeting.com", "gotomeeting.png"),
                ConferencingProvider::new("WebEx", ".webex.com", "webex.png"),
            ],
        }
    }
}

impl LinkConfig {
    fn provider_for(&self, url: &Url) -> Option<&ConferencingProvider> {
        let host = url.host_str()?;
        self.conferencing
            .iter()
            .find(|p| host.ends_with(p.domain.as_str()))
    }
}

/// Provider-specific hints about where a meeting happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConferenceHints {
    /// Structured conference data (Google `conferenceData`).
    pub solution: Option<ConferenceSolution>,
    /// Join URL of a Microsoft online meeting.
    pub online_meeting_url: Option<String>,
    /// Free-form location, which sometimes is just a meeting URL.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConferenceSolution {
    pub name: String,
    pub icon_uri: String,
    pub entry_point_uris: Vec<String>,
}

/// Parse a possibly scheme-less URL. Anything without a host is rejected.
fn parse_lenient(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(_) => Url::parse(&format!("https://{raw}")).ok(),
    }
}

/// Normalize one link. `None` for unparseable, ignored and `tel:` links.
pub fn process_link(raw: &str, text: Option<&str>, cfg: &LinkConfig) -> Option<LinkInfo> {
    let url = parse_lenient(raw)?;
    if url.scheme() == "tel" || cfg.ignore.iter().any(|i| i == url.as_str()) {
        return None;
    }

    if cfg.provider_for(&url).is_some() {
        return Some(LinkInfo {
            url: url.to_string(),
            text: None,
            link_type: Some(LinkType::Conferencing),
        });
    }

    let text = text
        .filter(|t| !t.is_empty() && *t != url.as_str())
        .map(str::to_string);
    Some(LinkInfo {
        url: url.to_string(),
        text,
        link_type: None,
    })
}

/// Merge structured anchors (`href`, text) with URLs found in the plain
/// description. Deduplicated by normalized URL; anchors win.
pub fn process_links(
    anchors: &[(String, String)],
    description: Option<&str>,
    cfg: &LinkConfig,
) -> Vec<LinkInfo> {
    let mut links: Vec<LinkInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut anchor_text: HashSet<String> = HashSet::new();

    for (href, content) in anchors {
        let Some(link) = process_link(href, Some(content), cfg) else {
            continue;
        };
        if let Some(text) = &link.text {
            anchor_text.insert(text.clone());
        }
        match index.get(&link.url) {
            Some(&i) => links[i] = link,
            None => {
                index.insert(link.url.clone(), links.len());
                links.push(link);
            }
        }
    }

    if let Some(description) = description {
        for found in URL_REGEX.find_iter(description) {
            let found = found.as_str();
            if anchor_text.contains(found) {
                continue;
            }
            let Some(link) = process_link(found, None, cfg) else {
                continue;
            };
            if !index.contains_key(&link.url) {
                index.insert(link.url.clone(), links.len());
                links.push(link);
            }
        }
    }

    links
}

fn conferencing_details(url: &Url, cfg: &LinkConfig) -> Option<ConferenceInfo> {
    let provider = cfg.provider_for(url)?;
    Some(ConferenceInfo {
        name: provider.name.clone(),
        icon: provider.icon.clone(),
        url: url.to_string(),
    })
}

/// Decide how to join the meeting: structured conference data first, then
/// the online-meeting URL, then a URL location, then the first conferencing
/// link in the description.
pub fn conference_info(
    hints: &ConferenceHints,
    links: &[LinkInfo],
    cfg: &LinkConfig,
) -> Option<ConferenceInfo> {
    if let Some(solution) = &hints.solution {
        let entry = solution
            .entry_point_uris
            .iter()
            .filter(|uri| uri.starts_with("https:"))
            .find_map(|uri| Url::parse(uri).ok())?;
        return conferencing_details(&entry, cfg).or_else(|| {
            Some(ConferenceInfo {
                name: solution.name.clone(),
                icon: solution.icon_uri.clone(),
                url: entry.to_string(),
            })
        });
    }

    if let Some(join_url) = &hints.online_meeting_url {
        return parse_lenient(join_url).and_then(|url| conferencing_details(&url, cfg));
    }

    if let Some(location) = &hints.location {
        // Only a location that is itself a URL counts.
        if let Ok(url) = Url::parse(location) {
            return conferencing_details(&url, cfg);
        }
    }

    links
        .iter()
        .find(|l| l.link_type == Some(LinkType::Conferencing))
        .and_then(|l| parse_lenient(&l.url))
        .and_then(|url| conferencing_details(&url, cfg))
}
