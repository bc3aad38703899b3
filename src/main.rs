use tracing::info;

use tutorgraph::config;
use tutorgraph::error::GraphError;
use tutorgraph::graph::GraphStore;
use tutorgraph::logger;

#[tokio::main]
async fn main() -> Result<(), GraphError> {
    // .env is optional; real deployments set the vars directly
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level)?;
    info!(service = %config.service_name, backend = %config.graph.backend, "starting");

    // Connecting also bootstraps constraints and indexes, so running this
    // binary doubles as a schema migration step for fresh databases.
    let _store = GraphStore::connect(&config).await?;
    info!("graph store ready, schema ensured");
    Ok(())
}
