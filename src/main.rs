use actix_web::{App, HttpServer};
use color_eyre::eyre::{Report, WrapErr};
use ideabox_server::{
    config::Config,
    db::{self, postgres::PgStore, Store},
    log,
    managers::MemoryStore,
    server,
};
use std::sync::Arc;
use tracing::info;

async fn open_store(config: &Config) -> Result<Arc<dyn Store>, Report> {
    match &config.database_url {
        Some(database_url) => {
            let pool = db::new_pool(database_url, config.database_max_connections)
                .await
                .wrap_err("Unable to connect to database")?;
            db::migrate(&pool).await?;
            info!("Connected to database and applied migrations");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[actix_web::main]
async fn main() -> Result<(), Report> {
    log::init()?;
    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    server::register_system_actors(store);

    info!(bind_address = config.bind_address.as_str(), "Starting HTTP server");
    HttpServer::new(|| App::new().configure(server::configure))
        .bind(config.bind_address.as_str())
        .wrap_err_with(|| format!("Unable to bind to {}", config.bind_address))?
        .run()
        .await?;
    Ok(())
}
