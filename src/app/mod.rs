pub mod export_use_case;
pub mod migrate_use_case;
pub mod ports;
