pub mod config;
pub mod database_ops;
pub mod orchestrator;
pub mod scoring;
pub mod source;
pub mod sync;
pub mod thumbnails;
pub mod tracing;
pub mod worker_manager;

pub mod util {
    pub mod env;
}
