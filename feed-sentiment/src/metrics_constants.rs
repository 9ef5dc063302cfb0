pub const DOCUMENTS_IN: &str = "sentiment_in_total";
pub const DOCUMENTS_OUT: &str = "sentiment_out_total";
pub const DOCUMENTS_SKIPPED: &str = "sentiment_documents_skipped_total";
pub const FALLBACK_DOCUMENTS: &str = "sentiment_fallback_documents_total";
pub const SCORER_TIME: &str = "sentiment_latency_ms";
