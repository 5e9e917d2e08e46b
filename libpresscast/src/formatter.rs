//! Platform-specific post formatting
//!
//! Turns a [`SourcePost`] into the text each network receives. Every platform
//! has a template and a length rule; when the rendered text is too long the
//! formatter shortens the excerpt first, then drops hashtags from the end,
//! then shortens the title. The URL is never cut.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{FormattedPost, PlatformKind, SourcePost};

/// Words kept when an excerpt is derived from the post body
pub const EXCERPT_WORDS: usize = 55;

/// Length every URL counts for on X, regardless of its real length
pub const X_URL_WEIGHT: usize = 23;

const ELLIPSIS: &str = "…";

pub fn character_limit(kind: PlatformKind) -> usize {
    match kind {
        PlatformKind::X => 280,
        PlatformKind::Bluesky => 300,
        PlatformKind::LinkedIn => 3000,
        PlatformKind::Facebook => 63_206,
    }
}

pub fn default_template(kind: PlatformKind) -> &'static str {
    match kind {
        PlatformKind::X => "{title} {url} {hashtags}",
        PlatformKind::LinkedIn => "{title}\n\n{excerpt}\n\n{url}\n\n{hashtags}",
        PlatformKind::Bluesky => "{title}\n\n{excerpt}\n\n{url}",
        PlatformKind::Facebook => "{title}\n\n{excerpt}\n\n{hashtags}",
    }
}

pub fn default_max_hashtags(kind: PlatformKind) -> usize {
    match kind {
        PlatformKind::X => 3,
        _ => 5,
    }
}

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z0-9]+)?[^>]*>").expect("static regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("static regex"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("static regex"));

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "tr",
    "td", "figure", "figcaption", "hr", "section", "article",
];

/// Strip HTML, decode entities and collapse whitespace
pub fn clean_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_scripts, |caps: &Captures| {
        let name = caps
            .get(2)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        if BLOCK_TAGS.contains(&name.as_str()) {
            " "
        } else {
            ""
        }
    });
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Decode the entities WordPress emits in titles and excerpts
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                "hellip" => Some('…'),
                "ndash" => Some('–'),
                "mdash" => Some('—'),
                "lsquo" => Some('‘'),
                "rsquo" => Some('’'),
                "ldquo" => Some('“'),
                "rdquo" => Some('”'),
                _ if body.starts_with("#x") || body.starts_with("#X") => {
                    u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                }
                _ if body.starts_with('#') => body[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// The post excerpt, or the first words of its body when no excerpt was written
pub fn excerpt_for(post: &SourcePost) -> String {
    let excerpt = clean_text(&post.excerpt);
    if !excerpt.is_empty() {
        return excerpt;
    }

    let content = clean_text(&post.content);
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= EXCERPT_WORDS {
        return words.join(" ");
    }
    format!("{}{}", words[..EXCERPT_WORDS].join(" "), ELLIPSIS)
}

/// Hashtags from the post's tags, or its categories when it has no tags
pub fn hashtags_for(post: &SourcePost, max: usize) -> Vec<String> {
    let from_categories = post.tags.is_empty();
    let source = if from_categories {
        &post.categories
    } else {
        &post.tags
    };

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for term in source {
        if tags.len() >= max {
            break;
        }
        if from_categories && term.eq_ignore_ascii_case("uncategorized") {
            continue;
        }
        let Some(tag) = hashtag(term) else {
            continue;
        };
        if seen.insert(tag.to_lowercase()) {
            tags.push(format!("#{}", tag));
        }
    }
    tags
}

/// CamelCase a term into a hashtag body, e.g. `open source` → `OpenSource`
fn hashtag(term: &str) -> Option<String> {
    let decoded = decode_entities(term);
    let tag: String = decoded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    if tag.is_empty() || tag.chars().all(|c| c.is_numeric()) {
        None
    } else {
        Some(tag)
    }
}

/// Length of `text` as the platform counts it
pub fn measure(kind: PlatformKind, text: &str) -> usize {
    match kind {
        PlatformKind::X => {
            let mut length = text.chars().count();
            for url in URL.find_iter(text) {
                length = length - url.as_str().chars().count() + X_URL_WEIGHT;
            }
            length
        }
        _ => text.chars().count(),
    }
}

/// Cut `text` at a word boundary so that the result, ellipsis included, is
/// at most `max_chars` long
pub fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 1 {
        return String::new();
    }

    let head: String = text.chars().take(max_chars - 1).collect();
    let ends_on_word = text
        .chars()
        .nth(max_chars - 1)
        .map(char::is_whitespace)
        .unwrap_or(false);
    let cut = match head.rfind(char::is_whitespace) {
        _ if ends_on_word => head.as_str(),
        Some(pos) if pos > 0 => &head[..pos],
        _ => head.as_str(),
    };
    let cut = cut.trim_end_matches(|c: char| c.is_whitespace() || ",;:-–—".contains(c));
    if cut.is_empty() {
        return String::new();
    }
    format!("{}{}", cut, ELLIPSIS)
}

struct Parts {
    title: String,
    excerpt: String,
    url: String,
    hashtags: Vec<String>,
    author: String,
    categories: String,
}

fn render(template: &str, parts: &Parts) -> String {
    let substituted = PLACEHOLDER.replace_all(template, |caps: &Captures| match &caps[1] {
        "title" => parts.title.clone(),
        "excerpt" => parts.excerpt.clone(),
        "url" => parts.url.clone(),
        "hashtags" => parts.hashtags.join(" "),
        "author" => parts.author.clone(),
        "categories" => parts.categories.clone(),
        _ => caps[0].to_string(),
    });

    let lines: Vec<String> = substituted
        .lines()
        .map(|line| SPACES.replace_all(line.trim(), " ").into_owned())
        .collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Shorten one field so the rendered text loses roughly `over` characters
fn shrink(field: &mut String, over: usize) {
    let current = field.chars().count();
    let target = current.saturating_sub(over).min(current.saturating_sub(1));
    *field = if target < 2 {
        String::new()
    } else {
        truncate_words(field, target)
    };
}

#[derive(Debug, Clone)]
struct PlatformFormat {
    template: String,
    max_hashtags: usize,
}

/// Renders posts for each platform
#[derive(Debug, Clone)]
pub struct Formatter {
    formats: HashMap<PlatformKind, PlatformFormat>,
}

impl Default for Formatter {
    fn default() -> Self {
        let formats = PlatformKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    PlatformFormat {
                        template: default_template(kind).to_string(),
                        max_hashtags: default_max_hashtags(kind),
                    },
                )
            })
            .collect();
        Self { formats }
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply per-platform template and hashtag overrides from configuration
    pub fn from_config(config: &Config) -> Self {
        let mut formatter = Self::default();
        for kind in PlatformKind::ALL {
            if let Some(platform) = config.platform(kind) {
                if let Some(template) = &platform.template {
                    formatter = formatter.with_template(kind, template);
                }
                if let Some(max) = platform.max_hashtags {
                    formatter = formatter.with_max_hashtags(kind, max);
                }
            }
        }
        formatter
    }

    pub fn with_template(mut self, kind: PlatformKind, template: &str) -> Self {
        if let Some(format) = self.formats.get_mut(&kind) {
            format.template = template.to_string();
        }
        self
    }

    pub fn with_max_hashtags(mut self, kind: PlatformKind, max: usize) -> Self {
        if let Some(format) = self.formats.get_mut(&kind) {
            format.max_hashtags = max;
        }
        self
    }

    pub fn template(&self, kind: PlatformKind) -> &str {
        self.formats
            .get(&kind)
            .map(|f| f.template.as_str())
            .unwrap_or_else(|| default_template(kind))
    }

    /// Render `post` for `kind`, shortening it to fit the platform limit
    pub fn format(&self, post: &SourcePost, kind: PlatformKind) -> Result<FormattedPost> {
        let template = self.template(kind);
        let max_hashtags = self
            .formats
            .get(&kind)
            .map(|f| f.max_hashtags)
            .unwrap_or_else(|| default_max_hashtags(kind));

        let title = clean_text(&post.title);
        let excerpt = excerpt_for(post);
        let mut parts = Parts {
            title: title.clone(),
            excerpt: excerpt.clone(),
            url: post.url.trim().to_string(),
            hashtags: hashtags_for(post, max_hashtags),
            author: post.author.clone().unwrap_or_default(),
            categories: post
                .categories
                .iter()
                .map(|c| decode_entities(c))
                .collect::<Vec<_>>()
                .join(", "),
        };

        let uses_excerpt = template.contains("{excerpt}");
        let uses_hashtags = template.contains("{hashtags}");
        let uses_title = template.contains("{title}");
        let limit = character_limit(kind);

        let text = loop {
            let text = render(template, &parts);
            let length = measure(kind, &text);
            if length <= limit {
                break text;
            }
            let over = length - limit;

            if uses_excerpt && !parts.excerpt.is_empty() {
                shrink(&mut parts.excerpt, over);
            } else if uses_hashtags && !parts.hashtags.is_empty() {
                parts.hashtags.pop();
            } else if uses_title && !parts.title.is_empty() {
                shrink(&mut parts.title, over);
            } else {
                return Err(PlatformError::Validation(format!(
                    "{} post is {} characters even without excerpt, hashtags or title (limit {})",
                    kind.display_name(),
                    length,
                    limit
                ))
                .into());
            }
        };

        if parts.excerpt != excerpt || parts.title != title {
            tracing::debug!(
                "Shortened post {} for {} to {} characters",
                post.id,
                kind,
                measure(kind, &text)
            );
        }

        let link = match kind {
            // X unfurls the URL embedded in the text
            PlatformKind::X => None,
            _ if post.url.trim().is_empty() => None,
            _ => Some(post.url.trim().to_string()),
        };

        Ok(FormattedPost {
            platform: kind,
            text,
            link,
            title,
            description: excerpt,
            image_url: post.featured_image.clone(),
        })
    }

    /// Render a post for several platforms without publishing anything
    pub fn preview(
        &self,
        post: &SourcePost,
        platforms: &[PlatformKind],
    ) -> Vec<(PlatformKind, Result<FormattedPost>)> {
        platforms
            .iter()
            .map(|kind| (*kind, self.format(post, *kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresscastError;

    fn sample_post() -> SourcePost {
        let mut post = SourcePost::new(1, "Hello &amp; Welcome", "https://blog.example/hello");
        post.excerpt = "<p>A short <strong>intro</strong> to the blog.</p>".to_string();
        post.tags = vec!["open source".to_string(), "rust-lang".to_string()];
        post
    }

    #[test]
    fn test_clean_text_strips_tags_and_entities() {
        assert_eq!(
            clean_text("<p>One</p><p>Two &amp; three</p>"),
            "One Two & three"
        );
        assert_eq!(clean_text("wo<b>r</b>d"), "word");
        assert_eq!(clean_text("It&#8217;s &#8220;fine&#8221;&hellip;"), "It’s “fine”…");
        assert_eq!(clean_text("a&nbsp;&nbsp;b\n\n c"), "a b c");
        assert_eq!(clean_text("<script>alert(1)</script>text"), "text");
        assert_eq!(clean_text("&#039;quoted&#039; &#x41;"), "'quoted' A");
        assert_eq!(clean_text("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn test_excerpt_falls_back_to_content_words() {
        let mut post = SourcePost::new(1, "T", "https://e.x/t");
        post.content = (1..=60).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");

        let excerpt = excerpt_for(&post);
        assert!(excerpt.starts_with("w1 w2"));
        assert!(excerpt.ends_with("w55…"));

        post.content = "<p>Just a few words</p>".to_string();
        assert_eq!(excerpt_for(&post), "Just a few words");
    }

    #[test]
    fn test_hashtags_camel_case_and_dedupe() {
        let mut post = SourcePost::new(1, "T", "https://e.x/t");
        post.tags = vec![
            "open source".to_string(),
            "Open-Source".to_string(),
            "2024".to_string(),
            "!!!".to_string(),
            "web dev".to_string(),
        ];
        assert_eq!(hashtags_for(&post, 5), vec!["#OpenSource", "#WebDev"]);
        assert_eq!(hashtags_for(&post, 1), vec!["#OpenSource"]);
    }

    #[test]
    fn test_hashtags_fall_back_to_categories() {
        let mut post = SourcePost::new(1, "T", "https://e.x/t");
        post.categories = vec!["Uncategorized".to_string(), "News &amp; Events".to_string()];
        assert_eq!(hashtags_for(&post, 5), vec!["#NewsEvents"]);
    }

    #[test]
    fn test_default_templates() {
        let formatter = Formatter::new();
        let post = sample_post();

        let x = formatter.format(&post, PlatformKind::X).unwrap();
        assert_eq!(
            x.text,
            "Hello & Welcome https://blog.example/hello #OpenSource #RustLang"
        );
        assert!(x.link.is_none());

        let bluesky = formatter.format(&post, PlatformKind::Bluesky).unwrap();
        assert_eq!(
            bluesky.text,
            "Hello & Welcome\n\nA short intro to the blog.\n\nhttps://blog.example/hello"
        );
        assert_eq!(bluesky.link.as_deref(), Some("https://blog.example/hello"));

        let facebook = formatter.format(&post, PlatformKind::Facebook).unwrap();
        assert!(!facebook.text.contains("https://"));
        assert_eq!(facebook.link.as_deref(), Some("https://blog.example/hello"));
    }

    #[test]
    fn test_empty_placeholders_collapse() {
        let formatter = Formatter::new();
        let post = SourcePost::new(1, "Title only", "https://e.x/t");

        let linkedin = formatter.format(&post, PlatformKind::LinkedIn).unwrap();
        assert_eq!(linkedin.text, "Title only\n\nhttps://e.x/t");
    }

    #[test]
    fn test_unknown_placeholder_left_alone() {
        let formatter = Formatter::new().with_template(PlatformKind::Bluesky, "{title} {mood} {url}");
        let post = SourcePost::new(1, "T {url}", "https://e.x/t");
        let formatted = formatter.format(&post, PlatformKind::Bluesky).unwrap();
        // Values are substituted once; a placeholder inside the title is literal
        assert_eq!(formatted.text, "T {url} {mood} https://e.x/t");
    }

    #[test]
    fn test_x_counts_urls_as_fixed_weight() {
        let long_url = format!("https://blog.example/{}", "a".repeat(200));
        assert_eq!(measure(PlatformKind::X, &format!("hi {}", long_url)), 3 + 23);
        assert_eq!(
            measure(PlatformKind::Bluesky, &format!("hi {}", long_url)),
            3 + long_url.chars().count()
        );

        let formatter = Formatter::new();
        let post = SourcePost::new(1, "Short", long_url.as_str());
        let formatted = formatter.format(&post, PlatformKind::X).unwrap();
        assert!(formatted.text.contains(&long_url));
    }

    #[test]
    fn test_x_drops_hashtags_before_title() {
        let formatter = Formatter::new();
        let mut post = SourcePost::new(1, "t".repeat(240), "https://e.x/p");
        post.tags = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];

        // 240 + 1 + 23 = 264 leaves room for two tags
        let formatted = formatter.format(&post, PlatformKind::X).unwrap();
        assert!(measure(PlatformKind::X, &formatted.text) <= 280);
        assert!(formatted.text.starts_with(&"t".repeat(240)));
        assert!(formatted.text.ends_with("#Alpha #Beta"));
        assert!(!formatted.text.contains("#Gamma"));
    }

    #[test]
    fn test_x_shortens_long_title_at_word_boundary() {
        let formatter = Formatter::new();
        let title = "word ".repeat(80);
        let post = SourcePost::new(1, title.trim(), "https://e.x/p");

        let formatted = formatter.format(&post, PlatformKind::X).unwrap();
        assert!(measure(PlatformKind::X, &formatted.text) <= 280);
        assert!(formatted.text.contains("word… https://e.x/p"));
    }

    #[test]
    fn test_bluesky_shortens_excerpt_before_title() {
        let formatter = Formatter::new();
        let mut post = SourcePost::new(1, "A fine title", "https://e.x/p");
        post.excerpt = "lorem ipsum ".repeat(40);

        let formatted = formatter.format(&post, PlatformKind::Bluesky).unwrap();
        assert!(formatted.text.chars().count() <= 300);
        assert!(formatted.text.starts_with("A fine title\n\nlorem ipsum"));
        assert!(formatted.text.contains("…\n\nhttps://e.x/p"));
        // The card keeps the full description
        assert!(formatted.description.chars().count() > 300);
    }

    #[test]
    fn test_url_never_truncated_and_oversize_is_validation_error() {
        let formatter = Formatter::new();
        let url = format!("https://e.x/{}", "p".repeat(400));
        let post = SourcePost::new(1, "Title", url.as_str());

        match formatter.format(&post, PlatformKind::Bluesky) {
            Err(PresscastError::Platform(PlatformError::Validation(msg))) => {
                assert!(msg.contains("limit 300"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("short", 10), "short");
        assert_eq!(truncate_words("hello brave new world", 12), "hello brave…");
        assert_eq!(truncate_words("abcdefghij", 5), "abcd…");
        assert!(truncate_words("hello, world again", 8).chars().count() <= 8);
        assert_eq!(truncate_words("hello, world again", 8), "hello…");
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_toml(
            r#"
[x]
template = "New: {title} {url}"
max_hashtags = 1

[linkedin]
max_hashtags = 1
"#,
        )
        .unwrap();
        let formatter = Formatter::from_config(&config);
        let post = sample_post();

        let x = formatter.format(&post, PlatformKind::X).unwrap();
        assert_eq!(x.text, "New: Hello & Welcome https://blog.example/hello");

        let linkedin = formatter.format(&post, PlatformKind::LinkedIn).unwrap();
        assert!(linkedin.text.ends_with("#OpenSource"));
    }

    #[test]
    fn test_preview_renders_each_platform() {
        let formatter = Formatter::new();
        let previews = formatter.preview(&sample_post(), &PlatformKind::ALL);
        assert_eq!(previews.len(), 4);
        assert!(previews.iter().all(|(_, result)| result.is_ok()));
    }
}
