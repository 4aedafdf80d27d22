pub mod item;
pub mod loaders;
pub mod record;
pub mod result;

pub use item::{dedupe_items, FieldValue, InputRecord, PipelineItem};
pub use loaders::load_items;
pub use record::{Classification, ProfileData, Qualification, ResearchRecord, NOT_RELEVANT};
pub use result::{PipelineResult, UsageMetrics};
