pub mod json_source_adapter;
pub mod sqlite_target_adapter;
