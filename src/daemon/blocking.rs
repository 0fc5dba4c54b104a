//! Classification of activity records against the user's block lists. Pure
//! functions, all state stays with the caller.

use crate::daemon::storage::entities::ActivityRecord;

/// Outcome of classifying one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockVerdict {
    pub is_blocked_app: bool,
    pub is_blocked_domain: bool,
}

impl BlockVerdict {
    pub fn any(&self) -> bool {
        self.is_blocked_app || self.is_blocked_domain
    }
}

pub fn evaluate(
    record: &ActivityRecord,
    blocked_apps: &[String],
    blocked_domains: &[String],
) -> BlockVerdict {
    let owner = record.owner_name.to_lowercase();
    let is_blocked_app = !owner.is_empty()
        && blocked_apps
            .iter()
            .any(|app| owner.contains(&app.to_lowercase()));

    let url = effective_url(record).unwrap_or_default();
    // The match direction is platform-dependent on purpose: URL extraction
    // from window titles is much noisier on Windows, where the extracted
    // token is usually a fragment of the real domain.
    let is_blocked_domain = !url.trim().is_empty()
        && blocked_domains.iter().any(|domain| {
            if record.platform.as_ref() == "windows" {
                domain.contains(&url.to_lowercase())
            } else {
                url.contains(domain.as_str())
            }
        });

    BlockVerdict {
        is_blocked_app,
        is_blocked_domain,
    }
}

/// URL a record should be judged by. Windows browsers never report one
/// directly, so a domain is recovered from the window title instead.
pub fn effective_url(record: &ActivityRecord) -> Option<String> {
    if record.platform.as_ref() == "windows" && is_recognized_browser(&record.owner_name) {
        extract_url_from_title(&record.title)
    } else {
        record.url.clone()
    }
}

fn is_recognized_browser(owner_name: &str) -> bool {
    let owner = owner_name.to_lowercase();
    ["chrome", "firefox", "edge"]
        .iter()
        .any(|browser| owner.contains(browser))
}

/// Best-effort domain recovery from a window title. Browser titles rarely
/// carry a full URL, but tab titles often include the site's host name.
pub fn extract_url_from_title(title: &str) -> Option<String> {
    title.split_whitespace().find_map(domain_token)
}

fn domain_token(token: &str) -> Option<String> {
    let trimmed =
        token.trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | '<' | '>' | '"' | '\'' | ','));
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.');

    let labels = host.split('.').collect::<Vec<_>>();
    if labels.len() < 2 {
        return None;
    }
    if labels
        .iter()
        .any(|v| v.is_empty() || !v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
    {
        return None;
    }
    let top_level = labels[labels.len() - 1];
    if top_level.len() < 2 || !top_level.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    Some(host.to_ascii_lowercase())
}
