pub mod estimators;
pub mod group;
pub mod metrics_set;
pub mod percentiles;
pub mod records;
pub mod stream;
pub mod summary;
pub mod system;

pub use estimators::{PhaseEstimators, StreamingMean, StreamingMedian, StreamingStdev, StreamingVariance};
pub use group::ProcessedResultsGroup;
pub use metrics_set::{
    actions_per_second, CommonStats, CustomMetric, ErrorCount, MetricType, MetricValue, MetricsGroup,
    MetricsSet,
};
pub use percentiles::{quantile_label, quantile_labels, StatSummary, QUANTILES};
pub use records::{
    CustomMetricsRecord, ErrorRecord, MetricsRecord, SharedMetricsRecord, StreamRecord,
    SystemMetricsRecord,
};
pub use stream::{StageStreamsSet, StreamAnalytics, StreamGroup, StreamSample};
pub use summary::{reconcile_bins, StageMetricsSummary};
pub use system::{MonitorGroup, MonitorSeries, SystemMetricsGroup, SystemMetricsSet};
