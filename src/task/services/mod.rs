//! Application services for task creation and caller-facing reads.

mod lifecycle;

pub use lifecycle::{
    CreateTaskRequest, DEFAULT_PAGE_LIMIT, HistoryPage, HistoryRequest, StatisticsReport,
    StatisticsSummary, TaskLifecycleError, TaskLifecycleResult, TaskLifecycleService, TaskLookup,
};
