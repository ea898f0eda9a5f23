// Migration pipeline: record processing, chunked loading, and in-memory stores

pub mod load;
pub mod processing;
pub mod storage;
