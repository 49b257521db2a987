pub mod calendar;
pub mod daycounter;
pub mod schedule;
