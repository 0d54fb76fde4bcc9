pub mod app;
pub mod archiver;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod notify;
pub mod pipeline;
pub mod platform;
pub mod retention;
pub mod scheduler;
pub mod validate;

#[cfg(test)]
mod testutil;
