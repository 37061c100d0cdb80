//! HTTP surface for health probes and Prometheus scraping

mod server;

pub use server::{bind, router, run_server};
