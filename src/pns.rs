// PNS (Public Information Statement) module
//
// Turns raw snowfall bulletins into typed observation records.
// Each document flows through three stages:
// - tokenizer: split the bulletin into per-station report blocks
// - extractor: locate raw field strings in each block
// - normalizer: canonicalize fields into an ObservationRecord or an InvalidRecord

pub mod event_codes;
pub mod extractor;
pub mod normalizer;
pub mod parser;
pub mod tokenizer;

pub use event_codes::EventCategory;
pub use extractor::{ExtractedFields, FieldExtractor};
pub use normalizer::{
    Coordinates, InvalidRecord, NormalizedRecord, Normalizer, NormalizerConfig, ObservationRecord, RecordField,
    SourceContext,
};
pub use parser::{Bulletin, BulletinParser, ParsedBulletin, PnsError, StructuralGap};
pub use tokenizer::{BlockLayout, RawBlock, TokenizedDocument};
