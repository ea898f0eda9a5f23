// Pipeline processing: field normalization, identity slugs, and deduplication

pub mod dedupe;
pub mod identity;
pub mod normalize;
pub mod slug;
