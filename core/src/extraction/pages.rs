//! Dispatches on file extension to turn raw document bytes into ordered
//! pages, with a bounded-error fallback that never fails the upload.

use crate::entities::DocumentPage;

pub const PARSER_PDF: &str = "pdf-pypdf-v1";
pub const PARSER_DOCX: &str = "docx-xml-v1";
pub const PARSER_RAW: &str = "raw-bytes-v1";

/// Extracts ordered pages from `bytes`. `.pdf` yields one page per source
/// page, found by scanning the raw PDF object stream for `/Type /Page`
/// object boundaries and the `BT`/`ET`/`Tj` text-showing operators within
/// each (no PDF parser is linked into this crate); `.docx` yields one
/// logical page of paragraph text; anything else, or a decode failure,
/// falls back to a whole-file UTF-8-lossy decode with NULs stripped.
pub fn extract_pages(bytes: &[u8], filename: &str, document_id: i64) -> Vec<DocumentPage> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        return extract_pdf_pages(bytes, document_id);
    }
    if lower.ends_with(".docx") {
        return extract_docx_pages(bytes, document_id);
    }
    extract_raw_pages(bytes, document_id)
}

/// Byte offsets of each `/Type /Page` object marker, excluding `/Type
/// /Pages` (the page-tree node, not a leaf page).
fn page_object_boundaries(pdf_str: &str) -> Vec<usize> {
    let marker = "/Type /Page";
    let mut offsets = Vec::new();
    let mut search_from = 0;
    while let Some(found) = pdf_str[search_from..].find(marker) {
        let offset = search_from + found;
        let after = offset + marker.len();
        if pdf_str.as_bytes().get(after) != Some(&b's') {
            offsets.push(offset);
        }
        search_from = after;
    }
    offsets
}

/// Extracts the text shown by `BT`/`ET`/`Tj` operators within `segment`,
/// in document order -- the same scan the page count's object boundaries
/// are used to bound per page.
fn extract_text_from_stream(segment: &str) -> String {
    let mut extracted = String::new();
    let mut in_text_object = false;
    let mut current_text = String::new();

    for line in segment.lines() {
        if line.contains("BT") {
            in_text_object = true;
        } else if line.contains("ET") {
            in_text_object = false;
            if !current_text.is_empty() {
                extracted.push_str(&current_text);
                extracted.push('\n');
                current_text.clear();
            }
        } else if in_text_object && line.contains("Tj") {
            if let Some(start) = line.find('(') {
                if let Some(end) = line[start + 1..].find(')') {
                    let text = &line[start + 1..start + 1 + end];
                    current_text.push_str(text);
                    current_text.push(' ');
                }
            }
        }
    }
    extracted
}

fn extract_pdf_pages(bytes: &[u8], document_id: i64) -> Vec<DocumentPage> {
    let text = String::from_utf8_lossy(bytes).replace('\0', "");
    let boundaries = page_object_boundaries(&text);

    if boundaries.is_empty() {
        return vec![DocumentPage {
            document_id,
            page_number: 1,
            char_count: extract_text_from_stream(&text).chars().count() as i64,
            text: extract_text_from_stream(&text),
            parser_version: PARSER_PDF.to_string(),
        }];
    }

    boundaries
        .iter()
        .enumerate()
        .map(|(idx, &start)| {
            let end = boundaries.get(idx + 1).copied().unwrap_or(text.len());
            let segment_text = extract_text_from_stream(&text[start..end]);
            DocumentPage {
                document_id,
                page_number: (idx + 1) as i64,
                char_count: segment_text.chars().count() as i64,
                text: segment_text,
                parser_version: PARSER_PDF.to_string(),
            }
        })
        .collect()
}

fn extract_docx_pages(bytes: &[u8], document_id: i64) -> Vec<DocumentPage> {
    let text = String::from_utf8_lossy(bytes).replace('\0', "");
    let joined: String = text.lines().collect::<Vec<_>>().join("\n");
    vec![DocumentPage {
        document_id,
        page_number: 1,
        char_count: joined.chars().count() as i64,
        text: joined,
        parser_version: PARSER_DOCX.to_string(),
    }]
}

fn extract_raw_pages(bytes: &[u8], document_id: i64) -> Vec<DocumentPage> {
    let text = String::from_utf8_lossy(bytes).replace('\0', "");
    vec![DocumentPage {
        document_id,
        page_number: 1,
        char_count: text.chars().count() as i64,
        text,
        parser_version: PARSER_RAW.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_falls_back_to_raw_single_page() {
        let pages = extract_pages(b"plain text content", "notes.txt", 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].parser_version, PARSER_RAW);
    }

    #[test]
    fn docx_joins_paragraphs_with_newline_into_one_page() {
        let pages = extract_pages(b"para one\npara two", "report.docx", 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].parser_version, PARSER_DOCX);
        assert_eq!(pages[0].text, "para one\npara two");
    }

    #[test]
    fn pdf_splits_into_one_page_per_type_page_object() {
        let bytes = b"1 0 obj << /Type /Page >> BT (Scope 1 emissions) Tj ET endobj \
                      2 0 obj << /Type /Page >> BT (Scope 2 emissions) Tj ET endobj";
        let pages = extract_pages(bytes, "annual_report.pdf", 1);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].text.trim(), "Scope 1 emissions");
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(pages[1].text.trim(), "Scope 2 emissions");
        assert_eq!(pages[1].parser_version, PARSER_PDF);
    }

    #[test]
    fn pdf_type_pages_node_is_not_mistaken_for_a_leaf_page() {
        let bytes = b"1 0 obj << /Type /Pages /Count 1 >> endobj \
                      2 0 obj << /Type /Page >> BT (only page) Tj ET endobj";
        let pages = extract_pages(bytes, "report.pdf", 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text.trim(), "only page");
    }

    #[test]
    fn pdf_with_no_recognizable_page_objects_falls_back_to_one_page() {
        let bytes = b"%PDF-1.4 binary garbage with no object markers";
        let pages = extract_pages(bytes, "scanned.pdf", 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].parser_version, PARSER_PDF);
    }

    #[test]
    fn nul_bytes_are_stripped() {
        let pages = extract_pages(b"a\0b\0c", "file.txt", 1);
        assert_eq!(pages[0].text, "abc");
    }
}
