mod config;
mod error;
mod input;
mod model;
mod preprocess;
mod routes;
mod service;
#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use config::Settings;
use model::store::ModelStore;
use routes::configure_routes;
use service::InferenceService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    log::info!(
        "Model {} ({:?}), input {}x{} {:?}, threshold {}",
        settings.model.path.display(),
        settings.model.backend,
        settings.image.width,
        settings.image.height,
        settings.image.layout,
        settings.model.threshold
    );

    let store = model::loader_for(settings.model.backend, &settings.image)
        .and_then(|loader| ModelStore::open(&settings.model.path, loader));
    let store = match store {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to load model at startup: {}", e);
            return Err(std::io::Error::other(format!("Model loading failed: {}", e)));
        }
    };

    let service = web::Data::new(InferenceService::new(
        store,
        settings.image.clone(),
        settings.model.threshold,
    ));
    let limits = web::Data::new(settings.limits.clone());

    let bind_address = settings.bind_address();
    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .app_data(limits.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }
    server.bind(&bind_address)?.run().await
}
