//! Domain model for the task lifecycle.
//!
//! Tasks, their events, archived history and daily statistics live here.
//! Nothing in this module touches storage or the ledger.

mod amount;
mod error;
mod event;
mod history;
mod ids;
mod statistics;
mod task;

pub use amount::{AMOUNT_DECIMALS, Amount, AmountParseError};
pub use error::{ParseEventTypeError, ParseTaskStatusError, ParseTaskTypeError, TaskDomainError};
pub use event::{EventType, TaskEvent};
pub use history::{HistoryQuery, HistoryRecord};
pub use ids::{Receiver, TaskId, TxRef};
pub use statistics::DailyStatistic;
pub use task::{
    NewTask, PersistedTaskData, Task, TaskMetadata, TaskPatch, TaskStatus, TaskType,
};
