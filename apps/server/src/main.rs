use anyhow::Context;
use centra_domain::config::ApiConfig;
use centra_kernel::config::load_config;
use centra_logger::Logger;
use centra_server::Server;

#[centra_runtime::main(high_performance)]
async fn main() -> anyhow::Result<()> {
    let _log = Logger::builder().name(env!("CARGO_PKG_NAME")).init()?;

    let cfg: ApiConfig = load_config(Some("server")).context("Critical: Configuration is malformed")?;

    Server::builder().config(cfg).build().await?.run().await
}
