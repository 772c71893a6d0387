//! Native configuration file handling for the in-container extractor.
//!
//! `confext` is baked into the tool images and invoked over exec. It reads a
//! tool's native configuration source, merges any `key=value` overrides, and
//! emits one flat JSON object on stdout. Two native formats are supported,
//! selected by file extension: Spark properties (`key value` or `key=value`
//! lines, `#` comments) and the HBase `hbase-site.xml` property list.
//!
//! The binary is fail-soft (errors become `{"error": ...}` with exit 0); this
//! module is the fallible core it wraps.

use std::collections::BTreeMap;
use std::path::Path;

/// Flat key/value view of a native configuration file.
pub type ConfigMap = BTreeMap<String, String>;

/// Extractor failures. These surface to callers as JSON `error` entries, not
/// as process failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Reading or writing the native file failed
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The XML property list was malformed
    #[error("malformed property XML: {0}")]
    Xml(String),

    /// An override argument was not of the form key=value
    #[error("override {0:?} is not of the form key=value")]
    BadOverride(String),
}

/// Native on-disk format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `key value` / `key=value` lines with `#` comments
    Properties,
    /// `<configuration><property><name/><value/></property>...` XML
    SiteXml,
}

impl ConfigFormat {
    /// Format for a file path: `.xml` means the property list, anything else
    /// the properties format.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => ConfigFormat::SiteXml,
            _ => ConfigFormat::Properties,
        }
    }
}

/// Read a native file, merge overrides, and optionally persist the merged
/// mapping back in the native format.
///
/// A missing file is treated as empty when overrides will recreate it; a
/// missing file with nothing to write is an error.
///
/// # Errors
///
/// Returns [`ExtractError`] on unreadable input, malformed XML, or a
/// malformed override.
pub fn extract(path: &Path, overrides: &[String], write: bool) -> Result<ConfigMap, ExtractError> {
    let format = ConfigFormat::for_path(path);

    let mut config = match std::fs::read_to_string(path) {
        Ok(text) => parse(format, &text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && write && !overrides.is_empty() => {
            ConfigMap::new()
        }
        Err(e) => return Err(e.into()),
    };

    for pair in overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ExtractError::BadOverride(pair.clone()))?;
        config.insert(key.to_string(), value.to_string());
    }

    if write {
        std::fs::write(path, render(format, &config))?;
    }

    Ok(config)
}

/// Parse text in the given format.
///
/// # Errors
///
/// Returns [`ExtractError::Xml`] for a malformed property list; the
/// properties format has no invalid inputs.
pub fn parse(format: ConfigFormat, text: &str) -> Result<ConfigMap, ExtractError> {
    match format {
        ConfigFormat::Properties => Ok(parse_properties(text)),
        ConfigFormat::SiteXml => parse_site_xml(text),
    }
}

/// Render a mapping in the given format.
pub fn render(format: ConfigFormat, config: &ConfigMap) -> String {
    match format {
        ConfigFormat::Properties => render_properties(config),
        ConfigFormat::SiteXml => render_site_xml(config),
    }
}

fn parse_properties(text: &str) -> ConfigMap {
    let mut config = ConfigMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Whichever separator comes first wins; Spark writes whitespace,
        // generic .properties files write '='.
        let (key, value) = match (line.find('='), line.find(char::is_whitespace)) {
            (Some(eq), Some(ws)) if ws < eq => line.split_at(ws),
            (Some(eq), _) => (&line[..eq], &line[eq + 1..]),
            (None, Some(ws)) => line.split_at(ws),
            (None, None) => (line, ""),
        };
        config.insert(key.trim().to_string(), value.trim().to_string());
    }
    config
}

fn render_properties(config: &ConfigMap) -> String {
    let mut out = String::new();
    for (key, value) in config {
        out.push_str(key);
        out.push(' ');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Minimal scan for `<property><name>..</name><value>..</value></property>`
/// blocks. The site files are machine-written with this exact shape; a full
/// XML parser buys nothing here.
fn parse_site_xml(text: &str) -> Result<ConfigMap, ExtractError> {
    let mut config = ConfigMap::new();
    let mut rest = text;

    while let Some(start) = rest.find("<property>") {
        let after = &rest[start + "<property>".len()..];
        let end = after
            .find("</property>")
            .ok_or_else(|| ExtractError::Xml("unterminated <property>".to_string()))?;
        let block = &after[..end];

        let name = tag_text(block, "name")
            .ok_or_else(|| ExtractError::Xml("property without <name>".to_string()))?;
        let value = tag_text(block, "value")
            .ok_or_else(|| ExtractError::Xml("property without <value>".to_string()))?;
        config.insert(xml_unescape(name), xml_unescape(value));

        rest = &after[end + "</property>".len()..];
    }
    Ok(config)
}

fn tag_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim())
}

fn render_site_xml(config: &ConfigMap) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<configuration>\n");
    for (key, value) in config {
        out.push_str("  <property>\n");
        out.push_str(&format!("    <name>{}</name>\n", xml_escape(key)));
        out.push_str(&format!("    <value>{}</value>\n", xml_escape(value)));
        out.push_str("  </property>\n");
    }
    out.push_str("</configuration>\n");
    out
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
