//! Slide-deck text extraction.
//!
//! A PPTX file is a zip archive with one XML document per slide, named
//! `ppt/slides/slide1.xml`, `slide2.xml`, and so on. Slides are probed by
//! sequential number; the first missing entry ends the deck. A deck with a
//! numbering gap (slide3 missing, slide4 present) therefore truncates early;
//! that termination condition is inherited behavior, not an invariant of the
//! format.

use std::io::{Cursor, Read};

use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use thiserror::Error;
use zip::ZipArchive;

const MAX_SLIDES: usize = 1_024;

#[derive(Debug, Error)]
pub enum SlideExtractError {
    #[error("not a valid slide archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to read {entry}: {source}")]
    Entry {
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed slide xml in {entry}: {source}")]
    Xml {
        entry: String,
        #[source]
        source: quick_xml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideDeckText {
    pub text: String,
    pub slide_count: usize,
}

/// Extract text from every sequentially numbered slide, rendering each as a
/// `Slide N:` block.
pub fn extract_slide_text(bytes: &[u8]) -> Result<SlideDeckText, SlideExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut text = String::new();
    let mut slide_count = 0usize;

    for number in 1..=MAX_SLIDES {
        let entry = format!("ppt/slides/slide{number}.xml");
        let xml = match archive.by_name(&entry) {
            Ok(mut file) => {
                let mut buf = String::new();
                file.read_to_string(&mut buf)
                    .map_err(|source| SlideExtractError::Entry {
                        entry: entry.clone(),
                        source,
                    })?;
                buf
            }
            Err(zip::result::ZipError::FileNotFound) => break,
            Err(error) => return Err(error.into()),
        };

        let runs = collect_text_runs(&xml).map_err(|source| SlideExtractError::Xml {
            entry: entry.clone(),
            source,
        })?;

        text.push_str(&format!("Slide {number}:\n{}\n\n", runs.join("\n")));
        slide_count = number;
    }

    Ok(SlideDeckText { text, slide_count })
}

/// Collect the contents of every namespace-qualified `a:t` node in document
/// order.
fn collect_text_runs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut runs = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"a:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"a:t" => in_text = false,
            Event::Text(t) if in_text => runs.push(t.unescape()?.into_owned()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn slide_xml(body: &str) -> String {
        format!(
            concat!(
                r#"<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" "#,
                r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
                "<p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"
            ),
            body
        )
    }

    fn build_deck(slides: &[(usize, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (number, body) in slides {
            writer
                .start_file(format!("ppt/slides/slide{number}.xml"), options)
                .expect("start zip entry");
            writer
                .write_all(slide_xml(body).as_bytes())
                .expect("write zip entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn slides_render_in_order_with_headers() {
        let deck = build_deck(&[
            (1, "<a:t>Hello 1</a:t>"),
            (2, "<a:t>Hello 2</a:t>"),
            (3, "<a:t>Hello 3</a:t>"),
        ]);
        let result = extract_slide_text(&deck).expect("extraction succeeds");
        assert_eq!(result.slide_count, 3);
        assert_eq!(
            result.text,
            "Slide 1:\nHello 1\n\nSlide 2:\nHello 2\n\nSlide 3:\nHello 3\n\n"
        );
    }

    #[test]
    fn two_slide_deck_matches_the_exact_contract() {
        let deck = build_deck(&[(1, "<a:t>A</a:t>"), (2, "<a:t>B</a:t>")]);
        let result = extract_slide_text(&deck).expect("extraction succeeds");
        assert_eq!(result.text, "Slide 1:\nA\n\nSlide 2:\nB\n\n");
        assert_eq!(result.slide_count, 2);
    }

    #[test]
    fn numbering_gap_truncates_the_deck() {
        let deck = build_deck(&[
            (1, "<a:t>Hello 1</a:t>"),
            (2, "<a:t>Hello 2</a:t>"),
            (4, "<a:t>Hello 4</a:t>"),
        ]);
        let result = extract_slide_text(&deck).expect("extraction succeeds");
        assert_eq!(result.slide_count, 2, "slide4 is unreachable past the gap");
        assert!(!result.text.contains("Hello 4"));
    }

    #[test]
    fn multiple_runs_per_slide_join_with_newlines() {
        let deck = build_deck(&[(1, "<a:t>Title</a:t><a:p/><a:t>Body line</a:t>")]);
        let result = extract_slide_text(&deck).expect("extraction succeeds");
        assert_eq!(result.text, "Slide 1:\nTitle\nBody line\n\n");
    }

    #[test]
    fn empty_deck_yields_no_slides() {
        let deck = build_deck(&[]);
        let result = extract_slide_text(&deck).expect("extraction succeeds");
        assert_eq!(result.slide_count, 0);
        assert_eq!(result.text, "");
    }

    #[test]
    fn garbage_bytes_fail_as_invalid_archive() {
        let err = extract_slide_text(b"not a zip").expect_err("must fail");
        assert!(matches!(err, SlideExtractError::Zip(_)));
    }
}
