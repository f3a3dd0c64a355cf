pub mod combine;
pub mod etl;
pub mod gene;
pub mod groups;
pub mod pipeline;

pub use crate::domain::model::{Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
pub use combine::CombinedTableBuilder;
pub use gene::{GeneProcessor, LoadedMethod};
pub use groups::ComparisonGroupDetector;
pub use pipeline::SelectionPipeline;
