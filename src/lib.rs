//! Result aggregation for load-testing stages.
//!
//! Raw per-request results are grouped per action, reduced to streaming
//! statistics, merged across workers, and fanned out to reporter backends
//! through one uniform contract.

pub mod config;
pub mod connectors;
pub mod error;
pub mod experiments;
pub mod metrics;
pub mod pool;
pub mod reporting;
pub mod results;
pub mod session;
pub mod tag;

pub use config::{load_config, Config};
pub use error::{ReportError, Result};
pub use pool::WorkerPool;
pub use reporting::{dispatch, DispatchReport, ReportPayload, Reporter, ReporterRegistry};
pub use session::{Session, SessionReport, StageAggregator};
pub use tag::Tag;
