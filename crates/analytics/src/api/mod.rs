pub mod table_store;

pub use table_store::{
    candidate_tables, ticker_slug, TableSelection, TableStoreClient, TableStoreConfig,
    DEFAULT_TABLE_CACHE_TTL,
};
