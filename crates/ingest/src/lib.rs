pub mod config;
pub mod error;
pub mod extractor;
pub mod hash;
pub mod memory;
pub mod pipeline;
pub mod ports;

pub use config::{ConfigError, IngestConfig};
pub use error::{IngestError, ValidationError};
pub use extractor::{default_extractor, ExtractError, MockExtractor, TextExtractor};
pub use hash::{file_digest, text_digest};
pub use memory::MemoryImportRepository;
pub use pipeline::{
    DuplicateMatch, ImportSummary, IngestOutcome, Ingestor, Prepared, PreparedImport,
};
pub use ports::{ImportRef, ImportRepository, StoreError};
