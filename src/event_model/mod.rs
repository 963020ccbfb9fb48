//! Event model primitives: the validated transaction record, the bounded
//! recently-seen dedup window, and the pluggable time source.

pub mod clock;
pub mod dedup;
pub mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DedupDecision, DedupWindow, DEFAULT_DEDUP_WINDOW_SIZE};
pub use transaction::{TransactionEvent, TransactionType, ValidationError};
