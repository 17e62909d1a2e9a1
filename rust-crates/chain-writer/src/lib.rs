use tracing_subscriber::EnvFilter;

pub mod api;

pub mod metadata;

pub mod operations;

pub mod queue;

pub mod signer;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
