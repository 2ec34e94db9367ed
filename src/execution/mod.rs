// Order execution: the position state machine, the bounded retry policy,
// and the lifecycle manager that reconciles working orders against the
// exchange.

pub mod lifecycle;
pub mod position;
pub mod retry;

pub use lifecycle::{LifecycleManager, OrderEvent, OrderTracker, PollOutcome};
pub use position::{Position, PositionState};
pub use retry::{with_retry, RetryPolicy};
