use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Source of local wall-clock time. Every "today" comparison in the engine
/// goes through this so tests and demos can pin the date.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen on one local date. The time of day is the real time of
/// day, so records logged through it still sort in arrival order.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        let time: NaiveTime = Local::now().time();
        self.date.and_time(time)
    }
}
