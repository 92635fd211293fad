use std::borrow::Cow;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::converter::{BoxError, Converter};

// Initialize syntax highlighting resources once
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const EXTENSIONS: [&str; 4] = ["md", "markdown", "mkd", "mkdn"];

/// Markdown to HTML with highlighted fenced code blocks.
pub struct MarkdownConverter {
    syntax_theme: String,
    lenient_headings: bool,
    priority: i32,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self {
            syntax_theme: "base16-ocean.dark".to_string(),
            lenient_headings: true,
            priority: 1,
        }
    }

    pub fn syntax_theme<S: Into<String>>(mut self, theme: S) -> Self {
        self.syntax_theme = theme.into();
        self
    }

    /// Accept `#Title` (no space) as a heading. On by default.
    pub fn lenient_headings(mut self, enabled: bool) -> Self {
        self.lenient_headings = enabled;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn to_html(&self, content: &str) -> String {
        let content = if self.lenient_headings {
            normalize_headings(content)
        } else {
            Cow::Borrowed(content)
        };

        let parser = Parser::new_ext(&content, Options::all());
        let events: Vec<Event> = parser.collect();
        let mut processed_events = Vec::with_capacity(events.len());
        let mut i = 0;

        while i < events.len() {
            match &events[i] {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                    // Collect all text events until the end of the code block
                    let mut code_content = String::new();
                    i += 1;

                    while i < events.len() {
                        match &events[i] {
                            Event::End(TagEnd::CodeBlock) => break,
                            Event::Text(text) => code_content.push_str(text),
                            _ => {}
                        }
                        i += 1;
                    }

                    processed_events.push(Event::Html(self.highlight(lang, &code_content).into()));
                }
                event => processed_events.push(event.clone()),
            }
            i += 1;
        }

        let mut out = String::new();
        html::push_html(&mut out, processed_events.into_iter());
        out
    }

    fn highlight(&self, lang: &str, code: &str) -> String {
        let plain = || format!("<pre><code>{}</code></pre>\n", html_escape::encode_text(code));

        let syntax = SYNTAX_SET.find_syntax_by_token(lang).or_else(|| {
            // Fallback mappings for unsupported languages
            match lang {
                "nix" => SYNTAX_SET.find_syntax_by_name("JavaScript"),
                "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
                _ => None,
            }
        });

        let (Some(syntax), Some(theme)) = (syntax, THEME_SET.themes.get(&self.syntax_theme)) else {
            return plain();
        };

        highlighted_html_for_string(code, &SYNTAX_SET, syntax, theme).unwrap_or_else(|e| {
            tracing::debug!(lang, error = %e, "Highlighting failed, emitting plain code");
            plain()
        })
    }
}

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn matches(&self, extension: &str) -> bool {
        EXTENSIONS
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    fn convert(&self, input: &str) -> Result<String, BoxError> {
        Ok(self.to_html(input))
    }

    fn out_extension(&self, _extension: &str) -> String {
        "html".to_string()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Insert the missing space in ATX headings written as `#Title`,
/// leaving fenced code untouched.
fn normalize_headings(input: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(input.len() + 8);
    let mut fence: Option<&str> = None;
    let mut changed = false;

    for line in input.split_inclusive('\n') {
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();

        if indent <= 3 {
            if let Some(marker) = fence {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
            } else if trimmed.starts_with("```") {
                fence = Some("```");
            } else if trimmed.starts_with("~~~") {
                fence = Some("~~~");
            } else {
                let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
                let rest = &trimmed[hashes..];
                if (1..=6).contains(&hashes)
                    && rest.chars().next().is_some_and(|c| !c.is_whitespace())
                {
                    out.push_str(&line[..indent + hashes]);
                    out.push(' ');
                    out.push_str(rest);
                    changed = true;
                    continue;
                }
            }
        }
        out.push_str(line);
    }

    if changed { Cow::Owned(out) } else { Cow::Borrowed(input) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_headings_and_paragraphs() {
        let html = MarkdownConverter::new().to_html("# Title\n\nSome *text*.");
        assert_eq!(html, "<h1>Title</h1>\n<p>Some <em>text</em>.</p>\n");
    }

    #[test]
    fn lenient_heading_without_space() {
        let converter = MarkdownConverter::new();
        assert_eq!(converter.to_html("#hi").trim_end(), "<h1>hi</h1>");

        let strict = MarkdownConverter::new().lenient_headings(false);
        assert_eq!(strict.to_html("#hi").trim_end(), "<p>#hi</p>");
    }

    #[test]
    fn normalize_skips_code_fences() {
        let input = "```\n#include <stdio.h>\n```\n#Title\n";
        assert_eq!(
            normalize_headings(input),
            "```\n#include <stdio.h>\n```\n# Title\n"
        );
        assert!(matches!(normalize_headings("# ok\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn unknown_language_is_escaped() {
        let html = MarkdownConverter::new().to_html("```nosuchlang\n<a>\n```\n");
        assert_eq!(html, "<pre><code>&lt;a&gt;\n</code></pre>\n");
    }

    #[test]
    fn known_language_is_highlighted() {
        let html = MarkdownConverter::new().to_html("```rust\nfn main() {}\n```\n");
        assert!(html.starts_with("<pre style="));
        assert!(html.contains("main"));
    }

    #[test]
    fn matches_markdown_extensions() {
        let converter = MarkdownConverter::new();
        assert!(converter.matches("md"));
        assert!(converter.matches("MARKDOWN"));
        assert!(!converter.matches("html"));
        assert_eq!(converter.out_extension("md"), "html");
        assert_eq!(converter.priority(), 1);
        assert_eq!(MarkdownConverter::new().with_priority(7).priority(), 7);
    }
}
