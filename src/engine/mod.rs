//! Engine wiring: collaborator traits, manager builder and handler

pub mod builder;
pub mod expression;
pub mod handler;
pub mod traits;

pub use builder::StatisticsManagerBuilder;
pub use expression::ExpressionTable;
pub use handler::StatisticsHandler;
pub use traits::{DescriptorSource, ExpressionEvaluator, StatisticsWriter};
