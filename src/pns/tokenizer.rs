/// PNS Bulletin Tokenizer
///
/// Splits a Public Information Statement into per-station report blocks.
/// Blocks start at structural delimiters rather than fixed offsets:
/// - Narrative report lines: `ALY ... SNOW 4 TO 6 INCHES ... AS OF 0800 AM EST ON 02/08/25`
/// - Metadata rows inside a `**METADATA**` section: `:2/8/2025,0800 AM,NY,Albany,Colonie,...`
///
/// A document with no delimiters yields no blocks.
use regex::Regex;
use scraper::{Html, Selector};
use std::iter::Peekable;
use std::str::Lines;
use std::sync::LazyLock;
use tracing::debug;

static NARRATIVE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[KP][A-Z]{3}|[A-Z]{3})\s*\.{3}").expect("narrative marker pattern")
});

static METADATA_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:?\s*\d{1,2}/\d{1,2}/\d{2,4}\s*,").expect("metadata row pattern")
});

const METADATA_HEADER: &str = "**METADATA**";

/// How a block was laid out in the source bulletin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockLayout {
    /// Free-text report line with `...`-separated segments
    Narrative,
    /// Comma-delimited row from the `**METADATA**` section
    MetadataRow,
}

/// A contiguous span of bulletin text describing one station report
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub office_code: String,
    pub index: usize,
    pub layout: BlockLayout,
    pub text: String,
}

/// A bulletin with markup noise removed, ready to be split into blocks
#[derive(Debug, Clone)]
pub struct TokenizedDocument {
    office_code: String,
    text: String,
}

impl TokenizedDocument {
    pub fn new(office_code: &str, raw_text: &str) -> Self {
        let text = normalize_text(&strip_markup(raw_text));
        debug!(
            office_code,
            raw_len = raw_text.len(),
            text_len = text.len(),
            "Normalized bulletin text"
        );
        Self {
            office_code: office_code.trim().to_ascii_uppercase(),
            text,
        }
    }

    pub fn office_code(&self) -> &str {
        &self.office_code
    }

    /// Normalized bulletin text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lazily iterate report blocks. Each call starts again from the top.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            office_code: &self.office_code,
            lines: self.text.lines().peekable(),
            in_metadata: false,
            next_index: 0,
        }
    }
}

/// Iterator over the report blocks of a [`TokenizedDocument`]
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    office_code: &'a str,
    lines: Peekable<Lines<'a>>,
    in_metadata: bool,
    next_index: usize,
}

impl<'a> Blocks<'a> {
    fn emit(&mut self, layout: BlockLayout, text: String) -> RawBlock {
        let block = RawBlock {
            office_code: self.office_code.to_string(),
            index: self.next_index,
            layout,
            text,
        };
        self.next_index += 1;
        block
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = RawBlock;

    fn next(&mut self) -> Option<RawBlock> {
        while let Some(line) = self.lines.next() {
            let trimmed = line.trim();

            if trimmed.contains(METADATA_HEADER) {
                self.in_metadata = true;
                continue;
            }
            if is_terminator(trimmed) {
                self.in_metadata = false;
                continue;
            }

            if self.in_metadata && METADATA_ROW.is_match(trimmed) {
                return Some(self.emit(BlockLayout::MetadataRow, trimmed.to_string()));
            }

            if NARRATIVE_MARKER.is_match(trimmed) {
                let mut text = trimmed.to_string();
                // Continuation lines run until a blank line or the next delimiter
                while let Some(next) = self.lines.peek() {
                    let next = next.trim();
                    if next.is_empty()
                        || is_terminator(next)
                        || next.contains(METADATA_HEADER)
                        || NARRATIVE_MARKER.is_match(next)
                        || (self.in_metadata && METADATA_ROW.is_match(next))
                    {
                        break;
                    }
                    text.push(' ');
                    text.push_str(next);
                    self.lines.next();
                }
                return Some(self.emit(BlockLayout::Narrative, text));
            }
        }
        None
    }
}

fn is_terminator(line: &str) -> bool {
    line.starts_with("$$") || line.starts_with("&&")
}

/// Pull product text out of an HTML page. Plain text passes through unchanged.
fn strip_markup(raw: &str) -> String {
    if !looks_like_markup(raw) {
        return raw.to_string();
    }

    let document = Html::parse_document(raw);
    for selector in ["pre.glossaryProduct", "pre", "body"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        let texts: Vec<String> = document
            .select(&selector)
            .map(|element| element.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }

    document.root_element().text().collect::<String>()
}

fn looks_like_markup(raw: &str) -> bool {
    let head: String = raw.chars().take(4096).collect::<String>().to_ascii_lowercase();
    ["<html", "<pre", "<body", "<!doctype", "<br"]
        .iter()
        .any(|tag| head.contains(tag))
}

fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.replace(['\u{a0}', '\t'], " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
