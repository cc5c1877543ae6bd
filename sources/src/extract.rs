//! Plain-text extraction from document files.
//!
//! Supported formats are plain text, CSV, JSON, PDF, Word (`.docx`) and
//! Excel (`.xls`, `.xlsx`).

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::Reader as _;
use quick_xml::events::Event;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::ExtractionError;

/// Result type alias for extraction.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// File formats known to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Csv,
    Json,
    Pdf,
    Docx,
    /// Excel workbook, legacy or OOXML; the first sheet is read.
    Spreadsheet,
}

impl FileFormat {
    /// Detect the format from a file name's extension.
    pub fn from_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "xls" | "xlsx" => Ok(Self::Spreadsheet),
            "" => Err(ExtractionError::UnsupportedFormat(format!(
                "{name} has no extension"
            ))),
            _ => Err(ExtractionError::UnsupportedFormat(format!(".{ext}"))),
        }
    }
}

/// Read a file from disk and extract its text.
pub async fn extract_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    // Reject unknown formats before touching the disk.
    FileFormat::from_name(&name)?;

    let bytes = fs::read(path).await?;
    extract_bytes(&name, &bytes)
}

/// Extract text from in-memory file content, using `file_name` to pick the
/// format.
pub fn extract_bytes(file_name: &str, bytes: &[u8]) -> Result<String> {
    let format = FileFormat::from_name(file_name)?;
    debug!("Extracting {format:?} text from {file_name} ({} bytes)", bytes.len());

    match format {
        FileFormat::Text => utf8(bytes),
        FileFormat::Csv => Ok(render_table(&read_csv(&utf8(bytes)?)?)),
        FileFormat::Json => pretty_json(bytes),
        FileFormat::Pdf => pdf_text(bytes),
        FileFormat::Docx => docx_text(bytes),
        FileFormat::Spreadsheet => Ok(render_table(&read_first_sheet(bytes)?)),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| ExtractionError::InvalidUtf8(e.to_string()))
}

fn pretty_json(bytes: &[u8]) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    utf8(&out)
}

/// Rows of a CSV document; rows may have different lengths.
fn read_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .map(|record| Ok(record?.iter().map(str::to_string).collect()))
        .collect()
}

/// Cells of the first worksheet of an Excel workbook.
fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractionError::Malformed("workbook has no sheets".to_string()))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect())
}

/// Render rows as whitespace-aligned columns.
fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of every page in page order, pages separated by a newline.
fn pdf_text(bytes: &[u8]) -> Result<String> {
    let document = lopdf::Document::load_mem(bytes)?;
    if document.is_encrypted() {
        return Err(ExtractionError::Malformed("PDF is encrypted".to_string()));
    }

    let pages = document
        .get_pages()
        .into_keys()
        .map(|number| document.extract_text(&[number]))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(pages
        .iter()
        .map(|page| page.trim_end())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Paragraph text of a Word document, one paragraph per line.
fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Malformed(format!("word/document.xml: {e}")))?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut paragraphs = Vec::new();
    let mut paragraph: Option<String> = None;
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => paragraph = Some(String::new()),
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => paragraph.iter_mut().for_each(|p| p.push('\t')),
                b"w:br" => paragraph.iter_mut().for_each(|p| p.push('\n')),
                _ => {}
            },
            Event::Text(t) if in_text_run => {
                let text = t.unescape()?;
                paragraph.iter_mut().for_each(|p| p.push_str(&text));
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => paragraphs.extend(paragraph.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}
