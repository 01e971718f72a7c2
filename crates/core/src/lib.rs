pub mod category;
pub mod currency;
pub mod fx;
pub mod money;
pub mod period;
pub mod statement;
pub mod transaction;

pub use category::{
    CategorizationResult, CategoryVocabulary, SuggestionSource, DEFAULT_CATEGORIES, UNCATEGORIZED,
};
pub use currency::{Currency, CurrencyError};
pub use fx::{FxConversion, FxDateSource, FxRate, FxRateError};
pub use money::{format_minor, parse_lenient, round_half_up};
pub use period::DateRange;
pub use statement::{Import, ImportId, ImportStatus, NewImport};
pub use transaction::{DraftTransaction, ResolvedTransaction, SourceRef};
