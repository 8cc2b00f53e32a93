//! Domain model (ids, config, states, task aggregate, errors).

pub mod body;
pub mod config;
pub mod errors;
pub mod ids;
pub mod state;
pub mod task;

pub use body::TaskBody;
pub use config::{TaskConfig, TaskGroup};
pub use errors::{EngineError, ErrorKind, StoreError};
pub use ids::{ExecutionId, IdParseError, TaskId};
pub use state::{ExecutionState, TaskState};
pub use task::{Execution, Task};
