use serde_json::Value;

use crate::item::Attributes;

#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Front matter must be a mapping")]
    NotAMapping,
}

/// Split `text` into its front matter block and the remaining body.
///
/// Returns `None` when the text does not open with a `---` line or the
/// block is never closed.
pub fn split(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parse front matter into attributes. Text without front matter yields
/// empty attributes and the whole text as body.
pub fn parse(text: &str) -> Result<(Attributes, &str), FrontMatterError> {
    let Some((yaml, body)) = split(text) else {
        return Ok((Attributes::new(), text));
    };
    if yaml.trim().is_empty() {
        return Ok((Attributes::new(), body));
    }

    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((Attributes::new(), body)),
        _ => Err(FrontMatterError::NotAMapping),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mapping_and_body() {
        let (attrs, body) =
            parse("---\ntitle: Hello\ntags: [a, b]\ndate: 2024-01-02\n---\n# Body\n").unwrap();
        assert_eq!(attrs["title"], "Hello");
        assert_eq!(attrs["tags"], json!(["a", "b"]));
        assert_eq!(attrs["date"], "2024-01-02");
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn text_without_front_matter_is_all_body() {
        let (attrs, body) = parse("#hi").unwrap();
        assert!(attrs.is_empty());
        assert_eq!(body, "#hi");
    }

    #[test]
    fn empty_block() {
        let (attrs, body) = parse("---\n---\nbody").unwrap();
        assert!(attrs.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn unclosed_block_is_body() {
        assert_eq!(split("---\ntitle: x\n"), None);
    }

    #[test]
    fn rejects_scalars() {
        assert!(matches!(
            parse("---\njust text\n---\n"),
            Err(FrontMatterError::NotAMapping)
        ));
        assert!(matches!(
            parse("---\ntitle: [\n---\n"),
            Err(FrontMatterError::Yaml(_))
        ));
    }
}
