pub const FLAG_LOOKUPS_COUNTER: &str = "flag_lookups_total";
pub const FLAG_STORE_LOAD_TIME: &str = "flag_store_load_duration_ms";
pub const FLAG_STORE_ERRORS_COUNTER: &str = "flag_store_errors_total";
