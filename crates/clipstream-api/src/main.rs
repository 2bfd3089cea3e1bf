use clipstream_core::Config;

// mimalloc keeps allocator fragmentation down under concurrent streaming
// workloads, especially on musl-based container images.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    clipstream_core::config::load_dotenv();
    clipstream_api::telemetry::init_tracing();

    let config = Config::from_env()?;

    let app = clipstream_api::setup::initialize_app(config.clone()).await?;
    clipstream_api::setup::server::start_server(&config, app.router, app.cancel, app.scheduler)
        .await?;

    app.pool.close().await;
    Ok(())
}
