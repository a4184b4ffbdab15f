pub mod clock;
pub mod result_engine;
pub mod time_window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use result_engine::{
    Decision, EngineConfig, EngineSnapshot, HousekeepingReport, Outcome, ResultEngine,
    SessionRules, SessionSnapshot, SkipReason, TickReport,
};
pub use time_window::{minutes_of_day, HourMinute, TimeWindow};
