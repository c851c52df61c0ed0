pub mod config;
pub mod logging;

pub mod adapters;
pub mod control;
pub mod engine;
pub mod events;
pub mod fetch;
pub mod job_store;
pub mod metadata;
pub mod naming;
pub mod pause;
pub mod progress;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod transport;
pub mod workers;

pub use engine::{Collaborators, Engine};
