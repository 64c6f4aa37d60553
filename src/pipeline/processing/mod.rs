// Pipeline processing: normalization, identity, merging, fixing and assembly

pub mod assemble;
pub mod canonicalize;
pub mod fixers;
pub mod identity;
pub mod merge;
pub mod normalize;

pub use assemble::{align_prediction_input, assemble_views, scores_relation};
pub use canonicalize::canonical_column_name;
pub use identity::assign_entity_ids;
pub use normalize::normalize_table;
