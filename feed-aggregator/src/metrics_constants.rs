pub const DOCUMENTS_IN: &str = "aggregator_in_total";
pub const SNAPSHOTS_OUT: &str = "aggregator_out_total";
pub const EMPTY_WINDOWS: &str = "aggregator_empty_windows_total";
pub const WINDOW_DOCUMENTS: &str = "aggregator_window_documents";
pub const FLUSH_TIME: &str = "aggregator_flush_ms";
pub const SNAPSHOT_DOCUMENTS: &str = "aggregator_snapshot_documents";
pub const LAST_FLUSH: &str = "aggregator_last_flush_timestamp_seconds";
