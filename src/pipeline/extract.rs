//! Document extraction: uploaded bytes → plain / Markdown text.
//!
//! ## Why a temp file?
//!
//! Document converters work on paths, and the extension is the only format
//! hint an upload carries. [`extract_upload`] writes the bytes to a
//! [`tempfile::NamedTempFile`] that keeps the original extension, hands the
//! path to the extractor, and lets the `NamedTempFile` drop delete it,
//! whether extraction succeeded, failed, or panicked.
//!
//! ## Built-in formats
//!
//! [`BuiltinExtractor`] covers the formats people actually paste into a
//! translator:
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | txt, md, csv, json, html, … | UTF-8 text, BOM dropped |
//! | docx | paragraphs from `word/document.xml`, headings and list items kept |
//! | pptx | text per slide, slides in order, `<!-- Slide N -->` markers |
//! | xlsx | one GFM table per worksheet |
//!
//! Extracted text is returned as-is. Size and content are not second-guessed
//! here; the prompt builder embeds whatever comes out.

use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use zip::ZipArchive;

/// Extensions decoded as UTF-8 text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "markdown", "csv", "tsv", "json", "xml", "html", "htm", "yaml", "yml",
    "log", "rst", "srt", "vtt", "ini", "toml",
];

/// Converts a document on disk into text.
///
/// `filename` is the name the user uploaded; its extension is the format
/// hint and it is what error messages mention.
pub trait DocumentExtractor: Send + Sync {
    fn extract_file(&self, path: &Path, filename: &str) -> Result<String, ExtractionError>;
}

/// Lower-cased extension of `filename`, or an empty string.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Write `bytes` to a scoped temp file and extract it.
///
/// The temp file is removed before this function returns.
pub fn extract_upload(
    extractor: &dyn DocumentExtractor,
    bytes: &[u8],
    filename: &str,
) -> Result<String, ExtractionError> {
    let io_err = |source: std::io::Error| ExtractionError::Io {
        filename: filename.to_string(),
        source,
    };

    let ext = extension_of(filename);
    let suffix = if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;

    debug!(
        "Staged upload '{}' ({} bytes) at {}",
        filename,
        bytes.len(),
        tmp.path().display()
    );

    // `tmp` is dropped (and the file deleted) when this returns
    extractor.extract_file(tmp.path(), filename)
}

/// Async wrapper around [`extract_upload`].
///
/// Archive parsing is CPU-bound, so it runs on the blocking pool instead of
/// stalling a Tokio worker.
pub async fn extract_upload_blocking(
    extractor: Arc<dyn DocumentExtractor>,
    bytes: Vec<u8>,
    filename: String,
) -> Result<String, ExtractionError> {
    let name = filename.clone();
    tokio::task::spawn_blocking(move || extract_upload(extractor.as_ref(), &bytes, &filename))
        .await
        .map_err(|e| ExtractionError::Corrupt {
            filename: name,
            detail: format!("extraction task panicked: {e}"),
        })?
}

// ── Built-in extractor ───────────────────────────────────────────────────

/// Text, docx, pptx and xlsx extraction without external tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinExtractor;

impl DocumentExtractor for BuiltinExtractor {
    fn extract_file(&self, path: &Path, filename: &str) -> Result<String, ExtractionError> {
        let ext = extension_of(filename);
        info!(
            "Converting '{}' (type: {})",
            filename,
            if ext.is_empty() { "none" } else { ext.as_str() }
        );

        let text = match ext.as_str() {
            "" => extract_text(path, filename)?,
            e if TEXT_EXTENSIONS.contains(&e) => extract_text(path, filename)?,
            "docx" => extract_docx(&mut open_archive(path, filename)?, filename)?,
            "pptx" => extract_pptx(&mut open_archive(path, filename)?, filename)?,
            "xlsx" => extract_xlsx(&mut open_archive(path, filename)?, filename)?,
            _ => {
                return Err(ExtractionError::UnsupportedFormat {
                    filename: filename.to_string(),
                    extension: ext,
                })
            }
        };

        debug!("Extracted {} bytes of text from '{}'", text.len(), filename);
        Ok(text)
    }
}

fn extract_text(path: &Path, filename: &str) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        filename: filename.to_string(),
        source,
    })?;
    decode_utf8(bytes, filename)
}

fn decode_utf8(mut bytes: Vec<u8>, filename: &str) -> Result<String, ExtractionError> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(..3);
    }
    String::from_utf8(bytes).map_err(|e| ExtractionError::InvalidEncoding {
        filename: filename.to_string(),
        offset: e.utf8_error().valid_up_to(),
    })
}

// ── Office archives ──────────────────────────────────────────────────────

type Archive = ZipArchive<File>;

fn corrupt(filename: &str, detail: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt {
        filename: filename.to_string(),
        detail: detail.to_string(),
    }
}

fn open_archive(path: &Path, filename: &str) -> Result<Archive, ExtractionError> {
    let file = File::open(path).map_err(|source| ExtractionError::Io {
        filename: filename.to_string(),
        source,
    })?;
    ZipArchive::new(file).map_err(|e| corrupt(filename, e))
}

/// Read one archive member; `None` when it does not exist.
fn read_part(
    archive: &mut Archive,
    name: &str,
    filename: &str,
) -> Result<Option<Vec<u8>>, ExtractionError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(filename, e)),
    };
    let mut buf = Vec::new();
    part.read_to_end(&mut buf).map_err(|e| corrupt(filename, e))?;
    Ok(Some(buf))
}

/// Member names matching `re`, ordered by the number captured in group 1.
fn numbered_parts(archive: &Archive, re: &Regex) -> Vec<(usize, String)> {
    let mut parts: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = re.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    parts.sort_unstable();
    parts
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

// ── docx ─────────────────────────────────────────────────────────────────

static RE_HEADING_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:heading)\s*([1-6])$").unwrap());

fn extract_docx(archive: &mut Archive, filename: &str) -> Result<String, ExtractionError> {
    let xml = read_part(archive, "word/document.xml", filename)?
        .ok_or_else(|| corrupt(filename, "missing word/document.xml"))?;
    docx_to_markdown(&xml).map_err(|e| corrupt(filename, e))
}

/// Paragraphs become Markdown blocks; `Heading N` / `Title` styles become
/// `#` headings and numbered paragraphs become `-` list items.
fn docx_to_markdown(xml: &[u8]) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut blocks: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut prefix = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    text.clear();
                    prefix.clear();
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:pStyle" => {
                    let style = attr(&e, b"w:val").unwrap_or_default();
                    if style.eq_ignore_ascii_case("title") {
                        prefix = "# ".to_string();
                    } else if let Some(caps) = RE_HEADING_STYLE.captures(&style) {
                        let level: usize = caps[1].parse().unwrap_or(1);
                        prefix = format!("{} ", "#".repeat(level));
                    }
                }
                b"w:numId" if prefix.is_empty() => prefix = "- ".to_string(),
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => text.push_str(&t.unescape()?),
            Event::CData(c) if in_text => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let line = text.trim_end();
                    if !line.trim().is_empty() {
                        blocks.push(format!("{prefix}{line}"));
                    }
                    text.clear();
                    prefix.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(blocks.join("\n\n"))
}

// ── pptx ─────────────────────────────────────────────────────────────────

static RE_SLIDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

fn extract_pptx(archive: &mut Archive, filename: &str) -> Result<String, ExtractionError> {
    let slides = numbered_parts(archive, &RE_SLIDE);
    if slides.is_empty() {
        return Err(corrupt(filename, "no slides found under ppt/slides/"));
    }

    let mut sections = Vec::with_capacity(slides.len());
    for (n, name) in slides {
        let xml = read_part(archive, &name, filename)?.unwrap_or_default();
        let paragraphs = drawing_paragraphs(&xml).map_err(|e| corrupt(filename, e))?;
        let mut section = format!("<!-- Slide {n} -->");
        if !paragraphs.is_empty() {
            section.push_str("\n\n");
            section.push_str(&paragraphs.join("\n"));
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

/// Non-empty `a:p` paragraphs built from their `a:t` runs.
fn drawing_paragraphs(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"a:p" => text.clear(),
                b"a:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"a:br" => text.push('\n'),
            Event::Text(t) if in_text => text.push_str(&t.unescape()?),
            Event::End(e) => match e.name().as_ref() {
                b"a:t" => in_text = false,
                b"a:p" => {
                    if !text.trim().is_empty() {
                        paragraphs.push(text.trim_end().to_string());
                    }
                    text.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

// ── xlsx ─────────────────────────────────────────────────────────────────

static RE_SHEET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").unwrap());

static RE_CELL_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+)(\d+)$").unwrap());

/// Zero-based index of column `XFD`, the last column a worksheet can have.
pub const MAX_COLUMN_INDEX: usize = 16_383;

/// Upper bound on rendered cells (rows × width) per sheet.
pub const MAX_TABLE_CELLS: usize = 1_000_000;

fn extract_xlsx(archive: &mut Archive, filename: &str) -> Result<String, ExtractionError> {
    let shared = match read_part(archive, "xl/sharedStrings.xml", filename)? {
        Some(xml) => shared_strings(&xml).map_err(|e| corrupt(filename, e))?,
        None => Vec::new(),
    };
    let names = match read_part(archive, "xl/workbook.xml", filename)? {
        Some(xml) => sheet_names(&xml).map_err(|e| corrupt(filename, e))?,
        None => Vec::new(),
    };

    let sheets = numbered_parts(archive, &RE_SHEET);
    if sheets.is_empty() {
        return Err(corrupt(filename, "no worksheets found under xl/worksheets/"));
    }

    let use_names = names.len() == sheets.len();
    let mut sections = Vec::with_capacity(sheets.len());
    for (i, (n, part)) in sheets.into_iter().enumerate() {
        let xml = read_part(archive, &part, filename)?.unwrap_or_default();
        let rows = sheet_rows(&xml, &shared, filename)?;
        let cells = table_width(&rows).saturating_mul(rows.len());
        if cells > MAX_TABLE_CELLS {
            return Err(corrupt(
                filename,
                format!("sheet {n} spans {cells} cells, more than the {MAX_TABLE_CELLS} supported"),
            ));
        }
        let title = if use_names {
            names[i].clone()
        } else {
            format!("Sheet {n}")
        };
        let mut section = format!("## {title}");
        if let Some(table) = render_table(&rows) {
            section.push_str("\n\n");
            section.push_str(&table);
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn sheet_names(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    let mut buf = Vec::new();
    let mut names = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                if let Some(name) = attr(&e, b"name") {
                    names.push(name);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

/// Column letters → zero-based index ("A" → 0, "AA" → 26); `None` past
/// [`MAX_COLUMN_INDEX`].
fn column_index(letters: &str) -> Option<usize> {
    let mut acc = 0usize;
    for b in letters.bytes() {
        acc = acc
            .checked_mul(26)?
            .checked_add((b.checked_sub(b'A')? + 1) as usize)?;
        if acc > MAX_COLUMN_INDEX + 1 {
            return None;
        }
    }
    acc.checked_sub(1)
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: String,
    value: String,
}

/// Rows of cell strings keyed by row and column position.
fn sheet_rows(
    xml: &[u8],
    shared: &[String],
    filename: &str,
) -> Result<BTreeMap<usize, BTreeMap<usize, String>>, ExtractionError> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut rows: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    let mut row = 0usize;
    let mut next_col = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| corrupt(filename, e))?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"row" => {
                    row = attr(&e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or_else(|| row.saturating_add(1));
                    next_col = 0;
                }
                b"c" => {
                    let col = match attr(&e, b"r") {
                        Some(r) => match RE_CELL_REF.captures(&r) {
                            Some(c) => column_index(&c[1]).ok_or_else(|| {
                                corrupt(filename, format!("cell reference '{r}' is out of range"))
                            })?,
                            None => next_col,
                        },
                        None => next_col,
                    };
                    if col > MAX_COLUMN_INDEX {
                        return Err(corrupt(filename, "worksheet has too many columns"));
                    }
                    next_col = col + 1;
                    cell = Some(CellState {
                        col,
                        kind: attr(&e, b"t").unwrap_or_default(),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"c" => next_col += 1,
            Event::Text(t) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&t.unescape().map_err(|e| corrupt(filename, e))?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        let text = match c.kind.as_str() {
                            "s" => c
                                .value
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|i| shared.get(i).cloned())
                                .unwrap_or_default(),
                            "b" => match c.value.trim() {
                                "1" => "TRUE".to_string(),
                                _ => "FALSE".to_string(),
                            },
                            _ => c.value,
                        };
                        if !text.is_empty() {
                            rows.entry(row).or_default().insert(c.col, text);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

/// Number of columns up to the rightmost populated cell.
fn table_width(rows: &BTreeMap<usize, BTreeMap<usize, String>>) -> usize {
    rows.values()
        .filter_map(|cols| cols.keys().next_back())
        .max()
        .map_or(0, |c| c + 1)
}

/// GFM table with the first populated row as header; `None` for an empty sheet.
fn render_table(rows: &BTreeMap<usize, BTreeMap<usize, String>>) -> Option<String> {
    let width = table_width(rows);
    if width == 0 {
        return None;
    }

    let render_row = |cols: &BTreeMap<usize, String>| {
        let cells: Vec<String> = (0..width)
            .map(|c| cols.get(&c).map(|v| escape_cell(v)).unwrap_or_default())
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, cols) in rows.values().enumerate() {
        lines.push(render_row(cols));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    Some(lines.join("\n"))
}
