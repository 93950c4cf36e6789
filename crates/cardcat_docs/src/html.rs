//! HTML side of the PDF pipeline: the per-card template and the paginated
//! document the PDF engine converts.

use std::path::Path;
use std::sync::LazyLock;

use cardcat_core::{Card, CardcatError, TemplateErrorPolicy};
use regex::Regex;
use tracing::{debug, warn};

/// Placed between card fragments; never after the last one.
pub const PAGE_BREAK: &str = r#"<div style="page-break-after: always;"></div>"#;

/// Template used when no `template_path` is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/card.html");

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_]+)(\?)?\s*\}\}").unwrap_or_else(|e| panic!("placeholder regex: {e}"))
});

/// Generate a complete HTML document with the given title and body HTML content.
pub fn generate_html(title: &str, body_html: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 2rem; line-height: 1.5; color: #222; }}
        .card img {{ max-width: 280px; }}
        .card .desc {{ white-space: pre-line; }}
        dt {{ font-weight: 600; }}
    </style>
</head>
<body>
{body_html}
</body>
</html>"#,
        title = escape_html(title),
        body_html = body_html,
    )
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A card value a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Type,
    FrameType,
    Desc,
    Atk,
    Def,
    Level,
    Race,
    Attribute,
    Archetype,
    ImageUrl,
    YgoprodeckUrl,
    SetCount,
    LowestPrice,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Field::Id,
            "name" => Field::Name,
            "type" => Field::Type,
            "frame_type" => Field::FrameType,
            "desc" => Field::Desc,
            "atk" => Field::Atk,
            "def" => Field::Def,
            "level" => Field::Level,
            "race" => Field::Race,
            "attribute" => Field::Attribute,
            "archetype" => Field::Archetype,
            "image_url" => Field::ImageUrl,
            "ygoprodeck_url" => Field::YgoprodeckUrl,
            "set_count" => Field::SetCount,
            "lowest_price" => Field::LowestPrice,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Type => "type",
            Field::FrameType => "frame_type",
            Field::Desc => "desc",
            Field::Atk => "atk",
            Field::Def => "def",
            Field::Level => "level",
            Field::Race => "race",
            Field::Attribute => "attribute",
            Field::Archetype => "archetype",
            Field::ImageUrl => "image_url",
            Field::YgoprodeckUrl => "ygoprodeck_url",
            Field::SetCount => "set_count",
            Field::LowestPrice => "lowest_price",
        }
    }

    /// Raw (unescaped) value; empty strings count as absent.
    fn value(&self, card: &Card) -> Option<String> {
        let value = match self {
            Field::Id => Some(card.id.to_string()),
            Field::Name => Some(card.name.clone()),
            Field::Type => Some(card.card_type.clone()),
            Field::FrameType => Some(card.frame_type.clone()),
            Field::Desc => Some(card.desc.clone()),
            Field::Atk => card.atk.map(|v| v.to_string()),
            Field::Def => card.def.map(|v| v.to_string()),
            Field::Level => card.level.map(|v| v.to_string()),
            Field::Race => Some(card.race.clone()),
            Field::Attribute => card.attribute.clone(),
            Field::Archetype => Some(card.archetype.clone()),
            Field::ImageUrl => card.image_url().map(String::from),
            Field::YgoprodeckUrl => Some(card.ygoprodeck_url.clone()),
            Field::SetCount => Some(card.card_sets.len().to_string()),
            Field::LowestPrice => card
                .lowest_price()
                .map(|(market, price)| format!("${price:.2} ({market})")),
        };
        value.filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { field: Field, optional: bool },
}

/// Per-card HTML template with `{{ field }}` and `{{ field? }}` placeholders.
///
/// A required placeholder with no value fails rendering for that card; an
/// optional one renders as nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardTemplate {
    segments: Vec<Segment>,
}

impl CardTemplate {
    /// Parse template source. Unknown field names and stray `{{` are load errors.
    pub fn parse(source: &str) -> Result<Self, CardcatError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            push_literal(&mut segments, &source[last..whole.start()])?;

            let name = &caps[1];
            let field = Field::parse(name).ok_or_else(|| {
                CardcatError::TemplateLoad(format!("unknown placeholder {{{{ {name} }}}}"))
            })?;
            segments.push(Segment::Placeholder {
                field,
                optional: caps.get(2).is_some(),
            });
            last = whole.end();
        }
        push_literal(&mut segments, &source[last..])?;

        Ok(Self { segments })
    }

    /// The template bundled with cardcat.
    pub fn builtin() -> Result<Self, CardcatError> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    pub fn load(path: &Path) -> Result<Self, CardcatError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CardcatError::TemplateLoad(format!("{}: {e}", path.display())))?;
        let template = Self::parse(&source)?;
        debug!(
            path = %path.display(),
            fields = template.fields().count(),
            "loaded card template"
        );
        Ok(template)
    }

    /// Load from `path` when given, else use the built-in template.
    pub fn from_path_or_builtin(path: Option<&Path>) -> Result<Self, CardcatError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder { field, .. } => Some(*field),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, card: &Card) -> Result<String, CardcatError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { field, optional } => match field.value(card) {
                    Some(value) => out.push_str(&escape_html(&value)),
                    None if *optional => {}
                    None => {
                        return Err(CardcatError::Template {
                            card_id: card.id,
                            message: format!("no value for required field {}", field.name()),
                        });
                    }
                },
            }
        }
        Ok(out)
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) -> Result<(), CardcatError> {
    if text.contains("{{") {
        return Err(CardcatError::TemplateLoad(
            "malformed placeholder: '{{' without a matching field".into(),
        ));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Paginated document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub html: String,
    pub pages: usize,
    /// Ids of cards left out under [`TemplateErrorPolicy::Skip`].
    pub skipped: Vec<i64>,
}

/// Render every card through `template`, one page per card.
pub fn render_document(
    title: &str,
    cards: &[Card],
    template: &CardTemplate,
    policy: TemplateErrorPolicy,
) -> Result<RenderedDocument, CardcatError> {
    let mut fragments = Vec::with_capacity(cards.len());
    let mut skipped = Vec::new();

    for card in cards {
        match template.render(card) {
            Ok(fragment) => fragments.push(fragment),
            Err(e) if e.is_recoverable() && policy == TemplateErrorPolicy::Skip => {
                warn!(card_id = card.id, error = %e, "skipping card page");
                skipped.push(card.id);
            }
            Err(e) => return Err(e),
        }
    }

    let separator = format!("\n{PAGE_BREAK}\n");
    let body = fragments.join(&separator);

    Ok(RenderedDocument {
        html: generate_html(title, &body),
        pages: fragments.len(),
        skipped,
    })
}

/// Inner HTML of `<body>`, or the whole input when there is none.
pub fn body_of(html: &str) -> &str {
    let lower = html.to_ascii_lowercase();
    let Some(open) = lower.find("<body") else {
        return html;
    };
    let Some(start) = lower[open..].find('>').map(|i| open + i + 1) else {
        return html;
    };
    let end = lower[start..]
        .find("</body>")
        .map_or(html.len(), |i| start + i);
    &html[start..end]
}

/// Split a paginated document into the HTML of each page.
pub fn split_pages(html: &str) -> Vec<&str> {
    let body = body_of(html);
    if body.trim().is_empty() {
        return Vec::new();
    }
    body.split(PAGE_BREAK).collect()
}
