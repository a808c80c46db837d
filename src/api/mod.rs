pub mod handlers;
pub mod middleware;
pub mod routes;

use actix_web::{web, App, HttpServer};
use log::info;
use std::sync::Arc;

use crate::biometrics::ContinuousLearningEngine;
use crate::config::Config;
use middleware::logging::RequestLogger;

pub async fn start_api_server(config: Config, engine: Arc<ContinuousLearningEngine>) -> std::io::Result<()> {
    let server_address = format!("{}:{}", config.api_host, config.api_port);
    info!("Starting API server on {}", server_address);

    let data = web::Data::from(Arc::clone(&engine));
    HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger::new())
            .app_data(data.clone())
            // Register API routes
            .configure(routes::register_routes)
    })
    .bind(server_address)?
    .workers(config.api_workers)
    .run()
    .await?;

    info!("API server stopped, flushing profile writes");
    engine.wait_for_persistence().await;
    Ok(())
}
