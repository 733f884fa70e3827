pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{BraidError, Result};
pub use event::SpanBus;
pub use traits::{CapabilityExecutor, ConditionEvaluator, NullSink, ObservabilitySink};
pub use types::*;
