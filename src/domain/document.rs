//! Document identity and lifecycle records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::domain::DomainError;

/// Normalised document categories accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    InternalRegulation,
    ExternalRegulation,
    InternalReport,
    ExternalReport,
    AuditIssue,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalRegulation => "internal_regulation",
            Self::ExternalRegulation => "external_regulation",
            Self::InternalReport => "internal_report",
            Self::ExternalReport => "external_report",
            Self::AuditIssue => "audit_issue",
        }
    }

    /// Display label used by the browsing endpoints.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InternalRegulation => "内部制度",
            Self::ExternalRegulation => "外部制度",
            Self::InternalReport => "内部报告",
            Self::ExternalReport => "外部报告",
            Self::AuditIssue => "审计问题",
        }
    }

    pub fn is_regulation(&self) -> bool {
        matches!(self, Self::InternalRegulation | Self::ExternalRegulation)
    }

    pub fn is_report(&self) -> bool {
        matches!(self, Self::InternalReport | Self::ExternalReport)
    }

    pub fn all() -> [DocType; 5] {
        [
            Self::InternalRegulation,
            Self::ExternalRegulation,
            Self::InternalReport,
            Self::ExternalReport,
            Self::AuditIssue,
        ]
    }
}

impl std::str::FromStr for DocType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal_regulation" => Ok(Self::InternalRegulation),
            "external_regulation" => Ok(Self::ExternalRegulation),
            "internal_report" => Ok(Self::InternalReport),
            "external_report" => Ok(Self::ExternalReport),
            "audit_issue" => Ok(Self::AuditIssue),
            other => Err(DomainError::bad_request(format!(
                "unknown doc_type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a registered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Active,
    Deleted,
}

/// Registry row describing one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// 16-hex prefix of the canonicalised content hash.
    pub doc_id: String,
    /// Original filename, Unicode preserved.
    pub filename: String,
    pub title: String,
    pub doc_type: DocType,
    /// Full SHA-256 of the canonicalised content.
    pub content_hash: String,
    pub file_size: u64,
    pub upload_time: DateTime<Utc>,
    pub version: u32,
    pub status: DocStatus,
    pub chunk_count: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocumentRecord {
    pub fn is_active(&self) -> bool {
        self.status == DocStatus::Active
    }
}

/// Canonicalise text before hashing: Unicode NFC, LF line endings,
/// trailing whitespace trimmed per line.
pub fn canonicalize_content(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    let mut out = String::with_capacity(nfc.len());
    for (i, line) in nfc.replace("\r\n", "\n").replace('\r', "\n").split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out
}

/// SHA-256 hex digest of canonicalised content.
pub fn content_hash(text: &str) -> String {
    let canonical = canonicalize_content(text);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic document id derived from the content hash.
pub fn doc_id_from_hash(hash: &str) -> String {
    hash.chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_round_trip() {
        for dt in DocType::all() {
            let parsed: DocType = dt.as_str().parse().unwrap();
            assert_eq!(parsed, dt);
        }
    }

    #[test]
    fn test_doc_type_rejects_unknown() {
        assert!("press_release".parse::<DocType>().is_err());
    }

    #[test]
    fn test_canonicalize_line_endings_and_trailing_ws() {
        let text = "第一条 内容。  \r\n第二条 内容。\t\r\n";
        let canonical = canonicalize_content(text);
        assert_eq!(canonical, "第一条 内容。\n第二条 内容。\n");
    }

    #[test]
    fn test_content_hash_ignores_trailing_whitespace() {
        assert_eq!(content_hash("abc  \ndef"), content_hash("abc\ndef"));
        assert_ne!(content_hash("abc\ndef"), content_hash("abc\ndeg"));
    }

    #[test]
    fn test_doc_id_is_16_hex() {
        let id = doc_id_from_hash(&content_hash("第一条 A内容。"));
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_nfc_normalisation_stabilises_hash() {
        // "é" composed vs decomposed
        let composed = "r\u{e9}glement";
        let decomposed = "re\u{301}glement";
        assert_eq!(content_hash(composed), content_hash(decomposed));
    }
}
