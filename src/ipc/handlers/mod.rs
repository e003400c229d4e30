pub mod activity;
pub mod core;
pub mod exercises;
pub mod goals;
pub mod levelup;
pub mod peer;
pub mod progress;
pub mod setup;
pub mod students;
