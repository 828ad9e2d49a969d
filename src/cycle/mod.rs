pub mod amend;
pub mod engine;
pub mod manual;
pub mod query;

pub use amend::Amendment;
pub use engine::{CycleState, LoadCycleEngine, SKEW_CORRECTION};
pub use manual::NOT_RECORDED;
pub use query::{count_closed_cycles, is_cycle_set_complete, list_cycles};
