use chrono::Datelike;
use serde_json::Value;

use crate::collection::item_date;
use crate::converter::extension_of;
use crate::item::{Item, PathKind};

const NONE_PATTERN: &str = "/:path/:basename.:extension";
const PRETTY_PAGE_PATTERN: &str = "/:path/:basename/";
const PRETTY_POST_PATTERN: &str = "/:categories/:year/:month/:day/:title/";
const DATE_PATTERN: &str = "/:categories/:year/:month/:day/:title.html";
const ORDINAL_PATTERN: &str = "/:categories/:year/:y_day/:title.html";

/// Resolved location of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    /// File path relative to the output root, e.g. `about/index.html`.
    pub path: String,
    /// Public URL, e.g. `/about/`.
    pub url: String,
}

/// Pattern for `style` as applied to `item`.
pub fn pattern_for(item: &Item, style: &str) -> String {
    let is_post = item.collection() == "posts";
    let pattern = match style {
        "none" => NONE_PATTERN,
        "pretty" if is_post => PRETTY_POST_PATTERN,
        "pretty" => PRETTY_PAGE_PATTERN,
        "date" if is_post => DATE_PATTERN,
        "ordinal" if is_post => ORDINAL_PATTERN,
        "date" | "ordinal" => NONE_PATTERN,
        custom => custom,
    };
    pattern.to_string()
}

/// Resolve the item's permalink. The item's `permalink` attribute wins over
/// `style`.
pub fn resolve(item: &Item, style: &str) -> Permalink {
    let extension = output_extension(item);
    let is_html = matches!(extension.as_str(), "html" | "htm");

    let mut pattern = match item.str_attribute("permalink") {
        Some(custom) => pattern_for(item, custom),
        None => pattern_for(item, style),
    };
    if pattern.ends_with('/') && !is_html {
        pattern = NONE_PATTERN.to_string();
    }

    Permalink::from_url(&expand(&pattern, item, &extension))
}

impl Permalink {
    /// Location for a URL: `/docs/` is written to `docs/index.html`,
    /// `/feed.xml` to `feed.xml`.
    pub fn from_url(url: &str) -> Self {
        let mut url = normalize(url);
        if let Some(parent) = url.strip_suffix("/index/") {
            url = format!("{parent}/");
        }

        let path = if url.ends_with('/') {
            format!("{}index.html", &url[1..])
        } else {
            url[1..].to_string()
        };
        Permalink { path, url }
    }
}

/// Lowercase, ASCII alphanumerics kept, everything else folded into `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn output_extension(item: &Item) -> String {
    let path = item
        .path(PathKind::RelativeAfterConvert)
        .or_else(|_| item.path(PathKind::Relative))
        .unwrap_or(item.id());
    extension_of(path).to_string()
}

fn expand(pattern: &str, item: &Item, extension: &str) -> String {
    let relative = item.path(PathKind::Relative).unwrap_or(item.id());
    let (dir, file_name) = relative.rsplit_once('/').unwrap_or(("", relative));
    let basename = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    let date = item_date(item);

    let title = item
        .str_attribute("title_path")
        .map(str::to_string)
        .unwrap_or_else(|| slugify(basename));
    let categories = categories(item).join("/");

    let mut out = String::with_capacity(pattern.len() + relative.len());
    let mut rest = pattern;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        let name = &tail[..len];

        let value = match name {
            "path" => dir.to_string(),
            "basename" => basename.to_string(),
            "extension" => extension.to_string(),
            "collection" => item.collection().to_string(),
            "title" => title.clone(),
            "categories" => categories.clone(),
            "year" => date.map(|d| d.year().to_string()).unwrap_or_default(),
            "month" => date.map(|d| format!("{:02}", d.month())).unwrap_or_default(),
            "day" => date.map(|d| format!("{:02}", d.day())).unwrap_or_default(),
            "i_month" => date.map(|d| d.month().to_string()).unwrap_or_default(),
            "i_day" => date.map(|d| d.day().to_string()).unwrap_or_default(),
            "y_day" => date.map(|d| format!("{:03}", d.ordinal())).unwrap_or_default(),
            _ => format!(":{name}"),
        };
        out.push_str(&value);
        rest = &tail[len..];
    }
    out.push_str(rest);
    out
}

fn categories(item: &Item) -> Vec<String> {
    match item.attribute("categories") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(slugify)
            .filter(|slug| !slug.is_empty())
            .collect(),
        Some(Value::String(value)) => vec![slugify(value)],
        _ => Vec::new(),
    }
}

/// Leading slash, no empty segments.
fn normalize(url: &str) -> String {
    let trailing = url.ends_with('/');
    let segments: Vec<&str> = url.split('/').filter(|s| !s.is_empty()).collect();
    let mut out = format!("/{}", segments.join("/"));
    if trailing && out.len() > 1 {
        out.push('/');
    }
    out
}
