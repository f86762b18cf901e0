//! Bounded undo/redo history for stores.

mod time_travel;

pub use time_travel::{TimeTravel, TimeTravelOptions};
