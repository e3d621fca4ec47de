use actix_web::{HttpRequest, HttpResponse, web};
use log::info;
use shared::{PredictResponse, ReloadResponse};

use crate::config::LimitsConfig;
use crate::error::ServiceError;
use crate::input::ImageInput;
use crate::service::InferenceService;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/reload").route(web::post().to(handle_reload)))
        .service(web::resource("/health").route(web::get().to(handle_health)));
}

async fn handle_predict(
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<InferenceService>,
    limits: web::Data<LimitsConfig>,
) -> Result<HttpResponse, ServiceError> {
    let input = ImageInput::extract(&req, payload, limits.max_payload_bytes).await?;
    let source = input.source();
    let image_bytes = input.into_bytes()?;

    let prediction = service.predict(&image_bytes)?;
    info!(
        "Prediction from {} ({} bytes): {} {}",
        source,
        image_bytes.len(),
        prediction.label,
        prediction.confidence
    );
    Ok(HttpResponse::Ok().json(PredictResponse::from(prediction)))
}

async fn handle_reload(service: web::Data<InferenceService>) -> Result<HttpResponse, ServiceError> {
    let service = service.into_inner();
    let model = web::block(move || service.reload_model()).await??;
    info!("Serving model generation {} ({})", model.generation, model.sha256);
    Ok(HttpResponse::Ok().json(ReloadResponse {
        status: "Model reloaded".to_string(),
    }))
}

async fn handle_health(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(service.health())
}
