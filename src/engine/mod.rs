//! Progress & incentive engine: turns append-only activity records into XP,
//! levels and streaks, and runs the peer economy (likes, secret-friend
//! missions). Every write to `students.total_xp` goes through an atomic
//! increment or an immediate transaction.

pub mod achievement;
pub mod activity;
pub mod awards;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod goals;
pub mod levels;
pub mod likes;
pub mod mailbox;
pub mod progress;
pub mod streak;
pub mod students;
pub mod textgen;
