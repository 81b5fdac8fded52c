#[macro_use]
extern crate lazy_static;

use std::path::PathBuf;

use actix_files::Files;
use actix_web::{
    middleware,
    web::{self, Data},
    App, HttpServer,
};
use log::info;
use sqlx::SqlitePool;

mod auth;
mod config;
mod db;
mod errors;
mod mortgage;
mod resources;
mod routes;
mod structs;
#[cfg(test)]
mod test_support;
mod utils;

use auth::TokenKeys;
use config::Config;

/// Process-wide dependencies, built once before the server binds.
#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    tokens: TokenKeys,
    static_dir: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().unwrap_or_else(|e| {
        log::error!("FATAL: {}", e);
        std::process::exit(1);
    });
    if config.token_ttl.is_none() {
        log::warn!("TOKEN_TTL_HOURS not set; issued tokens never expire");
    }

    let db_pool = db::connect(&config.database_url).await?;
    db::seed_admin(&db_pool).await?;

    let state = AppState {
        db_pool: db_pool.clone(),
        tokens: TokenKeys::new(&config.jwt_secret, config.token_ttl),
        static_dir: config.static_dir.clone(),
    };
    let serve_static = config.static_dir.is_dir();
    if !serve_static {
        log::warn!(
            "Static directory {} not found; serving the API only",
            config.static_dir.display()
        );
    }

    info!(
        "Starting HTTP server on http://{}:{}/",
        config.bind_addr, config.port
    );

    let server = HttpServer::new(move || {
        let mut app = App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .configure(routes::configure);
        if serve_static {
            app = app.service(
                Files::new("/", state.static_dir.clone())
                    .index_file("index.html")
                    .default_handler(web::to(routes::default_handler)),
            );
        }
        app.default_service(web::to(routes::default_handler))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await;

    db_pool.close().await;
    info!("Database pool closed");
    server
}
