/// Per-document pipeline: tokenize, extract, normalize
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::pns::extractor::FieldExtractor;
use crate::pns::normalizer::{
    InvalidRecord, NormalizedRecord, Normalizer, NormalizerConfig, ObservationRecord,
    SourceContext,
};
use crate::pns::tokenizer::TokenizedDocument;

/// One retrieved bulletin as handed over by the fetch collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Bulletin {
    pub office_code: String,
    pub raw_text: String,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PnsError {
    #[error("Bulletin from {office_code} is not text: {reason}")]
    FatalInput { office_code: String, reason: String },
    #[error("Invalid recognizer pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Non-fatal structural problems found while splitting a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralGap {
    /// The document contained no recognizable report delimiters
    EmptyDocument,
    /// A block was found but no field could be located in it
    EmptyBlock { index: usize },
}

impl fmt::Display for StructuralGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralGap::EmptyDocument => f.write_str("document contains no report blocks"),
            StructuralGap::EmptyBlock { index } => write!(f, "block {index} contains no fields"),
        }
    }
}

/// Result of running one bulletin through the pipeline
#[derive(Debug, Clone)]
pub struct ParsedBulletin {
    pub office_code: String,
    pub retrieved_at: DateTime<Utc>,
    /// One entry per block, in document order
    pub records: Vec<NormalizedRecord>,
    pub gaps: Vec<StructuralGap>,
}

impl ParsedBulletin {
    pub fn block_count(&self) -> usize {
        self.records.len()
    }

    pub fn valid_records(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.records.iter().filter_map(NormalizedRecord::as_valid)
    }

    pub fn invalid_records(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.records.iter().filter_map(NormalizedRecord::as_invalid)
    }

    pub fn valid_count(&self) -> usize {
        self.valid_records().count()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid_records().count()
    }
}

pub struct BulletinParser {
    extractor: FieldExtractor,
    normalizer: Normalizer,
}

impl BulletinParser {
    pub fn new(config: NormalizerConfig) -> Result<Self, PnsError> {
        Ok(Self {
            extractor: FieldExtractor::new()?,
            normalizer: Normalizer::new(config)?,
        })
    }

    /// Parse a bulletin whose text has already been decoded
    #[instrument(skip(self, bulletin), fields(office_code = %bulletin.office_code, text_len = bulletin.raw_text.len()))]
    pub fn parse(&self, bulletin: &Bulletin) -> Result<ParsedBulletin, PnsError> {
        if bulletin.raw_text.contains('\0') {
            return Err(PnsError::FatalInput {
                office_code: bulletin.office_code.clone(),
                reason: "contains NUL bytes".to_string(),
            });
        }

        let document = TokenizedDocument::new(&bulletin.office_code, &bulletin.raw_text);
        let mut records = Vec::new();
        let mut gaps = Vec::new();

        for block in document.blocks() {
            let fields = self.extractor.extract(&block);
            if fields.is_empty() {
                warn!(block_index = block.index, "Report block yielded no fields");
                gaps.push(StructuralGap::EmptyBlock { index: block.index });
            }

            let source = SourceContext {
                office_code: document.office_code(),
                block_index: block.index,
                collected_at: bulletin.retrieved_at,
            };
            records.push(self.normalizer.normalize(&fields, &source));
        }

        if records.is_empty() {
            warn!("Bulletin contains no report blocks");
            gaps.push(StructuralGap::EmptyDocument);
        }

        let parsed = ParsedBulletin {
            office_code: document.office_code().to_string(),
            retrieved_at: bulletin.retrieved_at,
            records,
            gaps,
        };

        if parsed.invalid_count() > 0 {
            warn!(
                "Skipped {} invalid records out of {} blocks",
                parsed.invalid_count(),
                parsed.block_count()
            );
        }
        info!(
            blocks = parsed.block_count(),
            valid = parsed.valid_count(),
            gaps = parsed.gaps.len(),
            "Parsed bulletin"
        );

        Ok(parsed)
    }

    /// Decode raw bytes as UTF-8 and parse them. Undecodable input is fatal for this bulletin only.
    pub fn parse_bytes(
        &self,
        office_code: &str,
        bytes: &[u8],
        retrieved_at: DateTime<Utc>,
    ) -> Result<ParsedBulletin, PnsError> {
        let raw_text = std::str::from_utf8(bytes).map_err(|e| {
            debug!(office_code, error = %e, "Bulletin bytes are not UTF-8");
            PnsError::FatalInput {
                office_code: office_code.to_string(),
                reason: e.to_string(),
            }
        })?;

        self.parse(&Bulletin {
            office_code: office_code.to_string(),
            raw_text: raw_text.to_string(),
            retrieved_at,
        })
    }
}
