//! Word-document text extraction.
//!
//! A DOCX file is a zip archive; the primary strategy parses
//! `word/document.xml` strictly. When that fails, a lenient secondary pass
//! scans every XML entry under `word/` (headers, footers, alternate content)
//! and keeps whatever text runs it can read. Only when both strategies fail
//! does extraction error, carrying both underlying messages for diagnostics.

use std::io::{Cursor, Read};

use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use thiserror::Error;
use zip::ZipArchive;

const DOCUMENT_ENTRY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum WordExtractError {
    #[error("primary strategy failed ({primary}); fallback strategy failed ({fallback})")]
    BothStrategies { primary: String, fallback: String },
}

#[derive(Debug, Error)]
enum StrategyError {
    #[error("not a valid docx archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing {DOCUMENT_ENTRY} entry")]
    MissingDocument,
    #[error("malformed document xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("no text content found in any word/ entry")]
    Empty,
}

/// Extract plain text from DOCX bytes, trying the strict strategy first and
/// a lenient archive scan second.
pub fn extract_word_text(bytes: &[u8]) -> Result<String, WordExtractError> {
    let primary = match extract_strict(bytes) {
        Ok(text) => return Ok(text),
        Err(error) => error,
    };

    match extract_lenient(bytes) {
        Ok(text) => {
            tracing::debug!(%primary, "word fallback strategy recovered text");
            Ok(text)
        }
        Err(fallback) => Err(WordExtractError::BothStrategies {
            primary: primary.to_string(),
            fallback: fallback.to_string(),
        }),
    }
}

fn extract_strict(bytes: &[u8]) -> Result<String, StrategyError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let xml = match archive.by_name(DOCUMENT_ENTRY) {
        Ok(mut entry) => {
            let mut buf = String::new();
            entry.read_to_string(&mut buf)?;
            buf
        }
        Err(zip::result::ZipError::FileNotFound) => return Err(StrategyError::MissingDocument),
        Err(error) => return Err(error.into()),
    };

    let text = collect_document_text(&xml)?;
    Ok(text.trim().to_string())
}

/// Lenient pass: walk every `word/*.xml` entry in archive order, keep what
/// parses, and skip what does not.
fn extract_lenient(bytes: &[u8]) -> Result<String, StrategyError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let entry_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("word/") && name.ends_with(".xml"))
        .map(|name| name.to_string())
        .collect();

    let mut collected = String::new();
    for name in entry_names {
        let mut xml = String::new();
        match archive.by_name(&name) {
            Ok(mut entry) => {
                if entry.read_to_string(&mut xml).is_err() {
                    continue;
                }
            }
            Err(_) => continue,
        }

        match collect_document_text(&xml) {
            Ok(text) if !text.trim().is_empty() => {
                if !collected.is_empty() {
                    collected.push('\n');
                }
                collected.push_str(text.trim());
            }
            _ => {}
        }
    }

    if collected.trim().is_empty() {
        return Err(StrategyError::Empty);
    }
    Ok(collected)
}

/// Walk WordprocessingML events, capturing `w:t` runs, mapping `w:tab` and
/// `w:br` to whitespace, and closing paragraphs with newlines.
fn collect_document_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_run = true;
                }
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text_run => {
                out.push_str(&t.unescape()?);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
