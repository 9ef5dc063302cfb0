pub const DOCUMENTS_OUT: &str = "producer_msgs_total";
pub const ROWS_SKIPPED: &str = "producer_rows_skipped_total";
pub const SOURCE_RESTARTS: &str = "producer_source_restarts_total";
