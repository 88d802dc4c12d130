//! Resolution by scraping HTML directory listings.
//!
//! Only anchors inside table rows whose class marks a normal entry are read.
//! Header and footer rows (parent links, sort links) never are.

use super::{child_folder, ResolveContext, ResolveStrategy, Visit};
use crate::utils::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Row classes that mark normal listing entries
pub const RELEVANT_ROW_CLASSES: &[&str] = &["odd", "even"];

/// Extensions that are never mirrored (archives, signatures, installers)
pub const IGNORED_EXTENSIONS: &[&str] = &["exe", "zip", "gz", "md5", "dmg"];

/// Anchor targets found in the relevant rows of one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingEntries {
    pub folders: BTreeSet<String>,
    pub files: BTreeSet<String>,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)([^>]*)>").expect("valid tag regex")
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute regex")
    })
}

fn attribute<'h>(attrs: &'h str, name: &str) -> Option<&'h str> {
    attr_regex().captures_iter(attrs).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
    })
}

/// Parse a listing page into child folders and candidate files.
/// Ignored extensions are still reported here; see [`is_ignored`].
pub fn parse_listing(html: &str) -> ListingEntries {
    let mut entries = ListingEntries::default();
    let mut in_relevant_row = false;

    for caps in tag_regex().captures_iter(html) {
        let Some(tag) = caps.get(2) else {
            continue; // comment
        };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let tag = tag.as_str().to_ascii_lowercase();
        let attrs = caps.get(3).map_or("", |m| m.as_str());

        match (tag.as_str(), closing) {
            ("tr", false) => {
                if attribute(attrs, "class").is_some_and(|c| RELEVANT_ROW_CLASSES.contains(&c)) {
                    in_relevant_row = true;
                }
            }
            ("tr", true) => in_relevant_row = false,
            ("a", false) if in_relevant_row => {
                if let Some(href) = attribute(attrs, "href") {
                    classify_href(&decode_entities(href), &mut entries);
                }
            }
            _ => {}
        }
    }

    entries
}

fn classify_href(href: &str, entries: &mut ListingEntries) {
    if is_navigation(href) {
        return;
    }
    if href.ends_with('/') {
        entries.folders.insert(href.to_string());
    } else {
        entries.files.insert(href.to_string());
    }
}

/// Absolute, parent, query and fragment targets are navigation, not content
fn is_navigation(href: &str) -> bool {
    href.is_empty()
        || href.starts_with('/')
        || href == ".."
        || href.starts_with("../")
        || href.starts_with('?')
        || href.starts_with('#')
        || Url::parse(href).is_ok()
}

/// Decode character references in one pass, so `&amp;lt;` yields `&lt;`
fn decode_entities(href: &str) -> String {
    let mut decoded = String::with_capacity(href.len());
    let mut rest = href;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').and_then(|end| Some((decode_entity(&tail[1..end])?, end))) {
            Some((c, end)) => {
                decoded.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Whether a file name carries an ignored extension
pub fn is_ignored(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IGNORED_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListingResolver;

#[async_trait]
impl ResolveStrategy for ListingResolver {
    fn name(&self) -> &'static str {
        "listing"
    }

    async fn resolve_folder(&self, ctx: &mut ResolveContext<'_>, folder: &Url) -> Result<Visit> {
        if !ctx.enter(folder) {
            debug!("Already visited {}", folder);
            return Ok(Visit::Applied);
        }

        let html = ctx.fetcher().fetch_text(folder).await?;
        let entries = parse_listing(&html);
        debug!(
            "{}: {} folders, {} files",
            folder,
            entries.folders.len(),
            entries.files.len()
        );

        for name in &entries.folders {
            let child = child_folder(folder, name)?;
            self.resolve_folder(ctx, &child).await?;
        }

        for name in &entries.files {
            if is_ignored(name) {
                debug!("Ignoring {}{}", folder, name);
                continue;
            }
            ctx.add_file(folder.join(name)?)?;
        }

        Ok(Visit::Applied)
    }
}
