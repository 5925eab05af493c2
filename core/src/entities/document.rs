use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationConfidence {
    Deterministic,
    Manual,
}

/// Belongs to one tenant; linked to one or more companies through
/// [`CompanyDocumentLink`]. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: i64,
    pub tenant_id: String,
    /// The company a document was originally uploaded against; additional
    /// companies may see it only through `CompanyDocumentLink`.
    pub company_id: i64,
    pub filename: String,
    pub doc_type: Option<String>,
    pub reporting_year: Option<i64>,
    pub source_url: Option<String>,
    pub classification_confidence: Option<ClassificationConfidence>,
}

/// Exactly-one-per-[`Document`] storage record. Invariant:
/// `sha256_hash == SHA-256(bytes stored at storage_uri)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFile {
    pub document_id: i64,
    pub sha256_hash: String,
    pub storage_uri: String,
}

/// Many-to-many link making a document visible to a company beyond the one
/// it was originally uploaded against, scoped within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyDocumentLink {
    pub company_id: i64,
    pub document_id: i64,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentPage {
    pub document_id: i64,
    pub page_number: i64,
    pub text: String,
    pub char_count: i64,
    pub parser_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: i64,
    pub chunk_id: String,
    pub page_number: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub text: String,
    pub content_tsv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    pub chunk_id: String,
    pub model_name: String,
    pub vector: Vec<f64>,
}

/// Deterministic document-type classification from title + URL, used to
/// populate `Document::doc_type` without any probabilistic model.
pub fn classify_doc_type(filename: &str, source_url: Option<&str>) -> Option<String> {
    let haystack = format!(
        "{} {}",
        filename.to_ascii_lowercase(),
        source_url.unwrap_or("").to_ascii_lowercase()
    );
    if haystack.contains("annual report") || haystack.contains("10-k") || haystack.contains("10k")
    {
        Some("annual_report".to_string())
    } else if haystack.contains("sustainability") || haystack.contains("esg") {
        Some("sustainability_report".to_string())
    } else if haystack.contains("prospectus") {
        Some("prospectus".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_annual_report_from_filename() {
        assert_eq!(
            classify_doc_type("2026_annual_report.pdf", None),
            Some("annual_report".to_string())
        );
    }

    #[test]
    fn classifies_from_source_url_when_filename_is_opaque() {
        assert_eq!(
            classify_doc_type(
                "doc123.pdf",
                Some("https://example.com/reports/sustainability-2026.pdf")
            ),
            Some("sustainability_report".to_string())
        );
    }

    #[test]
    fn unclassified_when_nothing_matches() {
        assert_eq!(classify_doc_type("scan0001.pdf", None), None);
    }
}
