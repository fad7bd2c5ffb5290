//! The job queue service: storage plus its HTTP surface.
pub mod server;
pub mod store;

pub use server::router;
pub use store::JobStore;
