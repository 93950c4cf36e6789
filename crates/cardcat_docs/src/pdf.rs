//! PDF document generation.
//!
//! The card template produces paginated HTML; a [`PdfEngine`] turns that into
//! PDF bytes. [`BuiltinPdfEngine`] lays the text out with the standard
//! Helvetica fonts and writes the file with `pdf-writer`.
//! [`CommandPdfEngine`] pipes the HTML through an external converter such as
//! `wkhtmltopdf - -`.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use cardcat_core::PdfEngineConfig;
use chrono::{Datelike, Timelike};
use pdf_writer::{Content, Date, Name, Pdf, Rect, Ref, Str, TextStr};
use regex::Regex;
use tracing::debug;

use crate::html::split_pages;

/// US Letter width, A4 height.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 72.0;
const TOP: f32 = 770.0;

const BODY_FONT: Name<'static> = Name(b"F2");
const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 15.4;
const BODY_WRAP: usize = 85;
const HEADING_FONT: Name<'static> = Name(b"F1");
const HEADING_SIZE: f32 = 18.0;
const HEADING_LEADING: f32 = 26.0;
const HEADING_WRAP: usize = 50;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .unwrap_or_else(|e| panic!("attribute regex: {e}"))
});

/// Converts a paginated HTML document into PDF bytes.
pub trait PdfEngine: Send + Sync {
    fn name(&self) -> &str;

    fn convert(&self, title: &str, html: &str) -> Result<Vec<u8>>;
}

pub fn engine_from_config(config: &PdfEngineConfig) -> Box<dyn PdfEngine> {
    match config {
        PdfEngineConfig::Builtin => Box::new(BuiltinPdfEngine),
        PdfEngineConfig::Command { program, args } => Box::new(CommandPdfEngine {
            program: program.clone(),
            args: args.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Built-in engine
// ---------------------------------------------------------------------------

/// Text-only layout: headings in bold, images as `[image] <url>` lines and
/// links followed by their target. Every HTML page starts a new PDF page;
/// long pages continue onto extra ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPdfEngine;

impl PdfEngine for BuiltinPdfEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    fn convert(&self, title: &str, html: &str) -> Result<Vec<u8>> {
        let mut pages = Vec::new();
        for page in split_pages(html) {
            pages.extend(layout_page(&html_to_lines(page)));
        }
        debug!(pages = pages.len(), "laid out PDF pages");
        Ok(write_pdf(title, &pages))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Heading,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub style: LineStyle,
    pub text: String,
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "br", "dl", "dt", "dd", "ul", "ol",
    "li", "table", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Flatten an HTML fragment into text lines, one per block element.
pub fn html_to_lines(html: &str) -> Vec<TextLine> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut style = LineStyle::Body;
    let mut href: Option<String> = None;
    let mut rest = html;

    while !rest.is_empty() {
        let Some(open) = rest.find('<') else {
            push_text(&mut current, rest);
            break;
        };
        push_text(&mut current, &rest[..open]);

        let Some(close) = rest[open..].find('>').map(|i| open + i) else {
            push_text(&mut current, &rest[open..]);
            break;
        };
        let tag = &rest[open + 1..close];
        rest = &rest[close + 1..];

        if tag.starts_with('!') || tag.starts_with('?') {
            continue;
        }
        let closing = tag.starts_with('/');
        let name = tag_name(tag);

        match name.as_str() {
            "style" | "script" | "head" | "title" if !closing => {
                let end = format!("</{name}");
                rest = match rest.to_ascii_lowercase().find(&end) {
                    Some(i) => rest[i..].find('>').map_or("", |j| &rest[i + j + 1..]),
                    None => "",
                };
            }
            "img" => {
                flush_line(&mut lines, &mut current, style);
                if let Some(src) = attribute(tag, "src").filter(|s| !s.is_empty()) {
                    lines.push(TextLine {
                        style: LineStyle::Body,
                        text: format!("[image] {src}"),
                    });
                }
            }
            "a" if closing => {
                if let Some(target) = href.take().filter(|h| !h.is_empty()) {
                    push_text(&mut current, &format!(" <{target}>"));
                }
            }
            "a" => href = attribute(tag, "href"),
            "h1" | "h2" | "h3" => {
                flush_line(&mut lines, &mut current, style);
                style = if closing {
                    LineStyle::Body
                } else {
                    LineStyle::Heading
                };
            }
            other if BLOCK_TAGS.contains(&other) => flush_line(&mut lines, &mut current, style),
            _ => {}
        }
    }
    flush_line(&mut lines, &mut current, style);
    lines
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn attribute(tag: &str, wanted: &str) -> Option<String> {
    ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(wanted) {
            return None;
        }
        let raw = caps.get(2).or_else(|| caps.get(3))?.as_str();
        Some(decode_entities(raw))
    })
}

/// Append decoded text, collapsing whitespace runs to one space.
fn push_text(current: &mut String, raw: &str) {
    for c in decode_entities(raw).chars() {
        if c.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(c);
        }
    }
}

fn flush_line(lines: &mut Vec<TextLine>, current: &mut String, style: LineStyle) {
    let text = current.trim();
    if !text.is_empty() {
        lines.push(TextLine {
            style,
            text: text.to_string(),
        });
    }
    current.clear();
}

pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "middot" => Some('\u{b7}'),
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

/// Greedy word wrap; words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            out.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            out.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&word);
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}

/// One positioned line of text on a PDF page.
#[derive(Debug, Clone, PartialEq)]
struct PlacedLine {
    style: LineStyle,
    y: f32,
    text: String,
}

/// Position the lines of one HTML page. Always yields at least one page;
/// lines that run past the bottom margin continue on a fresh page.
fn layout_page(lines: &[TextLine]) -> Vec<Vec<PlacedLine>> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut y = TOP;

    for line in lines {
        let (leading, width) = match line.style {
            LineStyle::Heading => (HEADING_LEADING, HEADING_WRAP),
            LineStyle::Body => (BODY_LEADING, BODY_WRAP),
        };
        for text in wrap(&line.text, width) {
            if y < MARGIN {
                pages.push(std::mem::take(&mut current));
                y = TOP;
            }
            current.push(PlacedLine {
                style: line.style,
                y,
                text,
            });
            y -= leading;
        }
    }
    pages.push(current);
    pages
}

/// Content stream for one laid-out page.
fn page_content(lines: &[PlacedLine]) -> Vec<u8> {
    let mut content = Content::new();
    for line in lines {
        let (font, size) = match line.style {
            LineStyle::Heading => (HEADING_FONT, HEADING_SIZE),
            LineStyle::Body => (BODY_FONT, BODY_SIZE),
        };
        let text = winansi(&line.text);
        content.begin_text();
        content.set_font(font, size);
        content.next_line(MARGIN, line.y);
        content.show(Str(&text));
        content.end_text();
    }
    content.finish().to_vec()
}

/// Encode for the WinAnsi font encoding: Latin-1 maps directly, the common
/// typographic characters to their 0x80-0x9f slots, anything else to `?`.
fn winansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' | '\u{25cf}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            _ => b'?',
        })
        .collect()
}

fn creation_date() -> Date {
    let now = chrono::Utc::now();
    Date::new(now.year() as u16)
        .month(now.month() as u8)
        .day(now.day() as u8)
        .hour(now.hour() as u8)
        .minute(now.minute() as u8)
        .second(now.second() as u8)
        .utc_offset_hour(0)
}

/// Assemble the laid-out pages into a PDF file. Zero pages give a valid
/// document with an empty page tree.
fn write_pdf(title: &str, pages: &[Vec<PlacedLine>]) -> Vec<u8> {
    let mut pdf = Pdf::new();
    let mut next = Ref::new(1);
    let catalog_id = next.bump();
    let tree_id = next.bump();
    let heading_id = next.bump();
    let body_id = next.bump();
    let info_id = next.bump();

    pdf.catalog(catalog_id).pages(tree_id);
    pdf.type1_font(heading_id)
        .base_font(Name(b"Helvetica-Bold"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));
    pdf.type1_font(body_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));
    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr("cardcat"))
        .creation_date(creation_date());

    let mut page_ids = Vec::with_capacity(pages.len());
    for lines in pages {
        let page_id = next.bump();
        let content_id = next.bump();
        page_ids.push(page_id);

        {
            let mut page = pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT))
                .parent(tree_id)
                .contents(content_id);
            page.resources()
                .fonts()
                .pair(HEADING_FONT, heading_id)
                .pair(BODY_FONT, body_id);
        }
        pdf.stream(content_id, &page_content(lines));
    }

    pdf.pages(tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);
    pdf.finish()
}

// ---------------------------------------------------------------------------
// External engine
// ---------------------------------------------------------------------------

/// Runs `program args...` with the HTML on stdin and reads the PDF from stdout.
#[derive(Debug, Clone)]
pub struct CommandPdfEngine {
    pub program: String,
    pub args: Vec<String>,
}

impl PdfEngine for CommandPdfEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn convert(&self, _title: &str, html: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start PDF engine `{}`", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("PDF engine stdin was not captured")?;
        let input = html.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .with_context(|| format!("PDF engine `{}` did not finish", self.program))?;
        let written = writer
            .join()
            .map_err(|_| anyhow!("PDF engine stdin writer panicked"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "PDF engine `{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        written.with_context(|| format!("Failed to send HTML to `{}`", self.program))?;

        if !output.stdout.starts_with(b"%PDF") {
            bail!("PDF engine `{}` did not produce a PDF", self.program);
        }
        debug!(engine = %self.program, bytes = output.stdout.len(), "converted HTML to PDF");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{PAGE_BREAK, generate_html};

    /// Page objects, not the `/Pages` tree node.
    fn page_count(bytes: &[u8]) -> usize {
        let text = String::from_utf8_lossy(bytes);
        text.match_indices("/Type /Page")
            .filter(|(at, m)| !text[at + m.len()..].starts_with('s'))
            .count()
    }

    fn document(pages: &[&str]) -> String {
        generate_html("Cards", &pages.join(PAGE_BREAK))
    }

    #[test]
    fn test_one_page_per_html_page() {
        let html = document(&["<h1>One</h1>", "<h1>Two</h1>", "<h1>Three</h1>"]);
        let bytes = BuiltinPdfEngine.convert("Cards", &html).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert_eq!(page_count(&bytes), 3);
        assert!(String::from_utf8_lossy(&bytes).contains("/Count 3"));
    }

    #[test]
    fn test_single_page_document() {
        let bytes = BuiltinPdfEngine
            .convert("Cards", &document(&["<p>Only card</p>"]))
            .unwrap();
        assert_eq!(page_count(&bytes), 1);
        assert!(String::from_utf8_lossy(&bytes).contains("Only card"));
    }

    #[test]
    fn test_empty_document_has_no_pages() {
        let bytes = BuiltinPdfEngine
            .convert("Empty", &generate_html("Empty", ""))
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(page_count(&bytes), 0);
        assert!(text.contains("/Count 0"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn test_long_page_overflows() {
        let body: String = (0..80).map(|i| format!("<p>Line {i}</p>")).collect();
        let bytes = BuiltinPdfEngine
            .convert("Long", &document(&[&body]))
            .unwrap();
        assert_eq!(page_count(&bytes), 2);
    }

    #[test]
    fn test_fonts_and_info() {
        let bytes = BuiltinPdfEngine
            .convert("Cards", &document(&["<p>a</p>"]))
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert_eq!(text.matches("/BaseFont /Helvetica").count(), 2);
        assert!(text.contains("/WinAnsiEncoding"));
        assert!(text.contains("/Producer"));
        assert!(text.contains("/CreationDate"));
    }

    #[test]
    fn test_layout_page_breaks_at_margin() {
        let lines: Vec<TextLine> = (0..60)
            .map(|i| TextLine {
                style: LineStyle::Body,
                text: format!("Line {i}"),
            })
            .collect();
        let pages = layout_page(&lines);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0][0].y, TOP);
        assert_eq!(pages[1][0].y, TOP);
        assert!(pages[0].iter().all(|line| line.y >= MARGIN));
        assert_eq!(pages[0].len() + pages[1].len(), 60);

        assert_eq!(layout_page(&[]), vec![Vec::new()]);
    }

    #[test]
    fn test_html_to_lines() {
        let lines = html_to_lines(
            r#"<style>p { color: red; }</style>
            <h1>Blue-Eyes  White Dragon</h1>
            <p class="meta">#89631139 &middot; Normal Monster</p>
            <img src="https://img/1.jpg" alt="x">
            <p><a href="https://ygoprodeck.com/card/1">Card page</a></p>"#,
        );
        assert_eq!(
            lines,
            vec![
                TextLine {
                    style: LineStyle::Heading,
                    text: "Blue-Eyes White Dragon".into()
                },
                TextLine {
                    style: LineStyle::Body,
                    text: "#89631139 \u{b7} Normal Monster".into()
                },
                TextLine {
                    style: LineStyle::Body,
                    text: "[image] https://img/1.jpg".into()
                },
                TextLine {
                    style: LineStyle::Body,
                    text: "Card page <https://ygoprodeck.com/card/1>".into()
                },
            ]
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#39;x&#x41;"), "'xA");
        assert_eq!(decode_entities("AT&T &bogus;"), "AT&T &bogus;");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_winansi() {
        assert_eq!(winansi("hello (x)"), b"hello (x)");
        assert_eq!(winansi("é"), vec![0xe9]);
        assert_eq!(winansi("●"), vec![0x95]);
        assert_eq!(winansi("a\u{2014}b"), vec![b'a', 0x97, b'b']);
        assert_eq!(winansi("日"), b"?");
    }

    #[test]
    fn test_engine_from_config() {
        assert_eq!(engine_from_config(&PdfEngineConfig::Builtin).name(), "builtin");
        let engine = engine_from_config(&PdfEngineConfig::Command {
            program: "wkhtmltopdf".into(),
            args: vec!["-".into(), "-".into()],
        });
        assert_eq!(engine.name(), "wkhtmltopdf");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_engine_reads_stdout() {
        let engine = CommandPdfEngine {
            program: "sh".into(),
            args: vec!["-c".into(), "cat >/dev/null; printf '%%PDF-1.4 stub'".into()],
        };
        let bytes = engine.convert("Cards", "<p>hi</p>").unwrap();
        assert_eq!(bytes, b"%PDF-1.4 stub");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_engine_failure_reports_stderr() {
        let engine = CommandPdfEngine {
            program: "sh".into(),
            args: vec!["-c".into(), "cat >/dev/null; echo boom >&2; exit 3".into()],
        };
        let err = engine.convert("Cards", "<p>hi</p>").unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_engine_rejects_non_pdf() {
        let engine = CommandPdfEngine {
            program: "cat".into(),
            args: Vec::new(),
        };
        let err = engine.convert("Cards", "<p>hi</p>").unwrap_err();
        assert!(err.to_string().contains("did not produce a PDF"));
    }

    #[test]
    fn test_missing_command_engine() {
        let engine = CommandPdfEngine {
            program: "/nonexistent/pdf-engine".into(),
            args: Vec::new(),
        };
        assert!(engine.convert("Cards", "<p>hi</p>").is_err());
    }
}
