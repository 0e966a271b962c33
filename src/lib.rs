// Data Money - Core Library
// Per-artist stream comparison (US vs Global) between two periods.
// Shared by the CLI, the API server, and tests.

pub mod config;
pub mod coverage;
pub mod db;
pub mod demo;
pub mod error;
pub mod lookback;
pub mod parser;
pub mod period;
pub mod snapshot;

// Re-export commonly used types
pub use config::{init_logging, AppConfig};
pub use coverage::{find_missing, write_missing_csv, MissingRecord};
pub use db::{
    compare_at_path, date_bounds, format_store_date, insert_streams, parse_store_date,
    setup_database, verify_count, DateBounds, InsertSummary, SqliteStore, StreamRow,
};
pub use demo::{make_demo, DemoSummary};
pub use error::{CompareError, CompareResult};
pub use lookback::Lookback;
pub use parser::{import_csv, load_stream_csv, read_stream_rows};
pub use period::{
    parse_reference_date, resolve_pair, resolve_period, GranularityMode, Period, WeekPolicy,
};
pub use snapshot::{
    build_comparison, compare, merge_counts, pct_change, Comparison, ComparisonRequest,
    ComparisonRow, Region, RegionCount, SnapshotCounts, StreamStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
