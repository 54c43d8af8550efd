mod settings;

pub use settings::{
    CompletionConfig, HistoryConfig, IndexConfig, LoggingConfig, Settings, StoreConfig,
    VerifierConfig,
};
