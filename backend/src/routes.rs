use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::{AnalyzeRequest, ErrorResponse};

use crate::pipeline::{AnalyzeOptions, PipelineError, PipelineOrchestrator};

pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const SEARCH_LIMIT: usize = 10;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_UPLOAD_BYTES))
        .service(web::resource("/api/analyze-food").route(web::post().to(analyze_food)))
        .service(web::resource("/api/inference").route(web::post().to(handle_inference)))
        .service(
            web::resource("/api/nutrition/{food_name}").route(web::get().to(get_nutrition)),
        )
        .service(web::resource("/api/search-food").route(web::get().to(search_food)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

fn pipeline_error_response(err: &PipelineError) -> HttpResponse {
    let body = ErrorResponse::new(err.to_string());
    match err {
        PipelineError::InvalidImage(_) => HttpResponse::BadRequest().json(body),
        PipelineError::NoPredictions => HttpResponse::UnprocessableEntity().json(body),
        PipelineError::Worker(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Accepts bare base64 or a `data:<mime>;base64,<payload>` URL.
fn decode_image_payload(image: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = match image.split_once(',') {
        Some((_, payload)) => payload,
        None => image,
    };
    STANDARD.decode(encoded.trim())
}

async fn analyze_food(
    pipeline: web::Data<PipelineOrchestrator>,
    request: web::Json<AnalyzeRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    let image_data = match decode_image_payload(&request.image) {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => {
            return HttpResponse::BadRequest().json(ErrorResponse::new("No image provided"));
        }
        Err(e) => {
            return HttpResponse::BadRequest()
                .json(ErrorResponse::new(format!("Invalid base64 image: {}", e)));
        }
    };

    let options = AnalyzeOptions {
        context: request.context,
        advanced_mode: request.advanced_mode,
    };
    match pipeline.analyze(&image_data, options).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            error!("Food analysis failed: {}", e);
            pipeline_error_response(&e)
        }
    }
}

/// Multipart upload: every file part is analyzed, a `context` text part
/// applies to all of them.
async fn handle_inference(
    pipeline: web::Data<PipelineOrchestrator>,
    mut payload: Multipart,
) -> Result<HttpResponse, actix_web::Error> {
    let mut images: Vec<Vec<u8>> = Vec::new();
    let mut context: Option<String> = None;
    let mut received = 0usize;

    while let Some(mut field) = payload.try_next().await? {
        let is_context = field.name() == Some("context");
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            received += chunk.len();
            if received > MAX_UPLOAD_BYTES {
                warn!("Rejecting upload larger than {} bytes", MAX_UPLOAD_BYTES);
                return Ok(HttpResponse::PayloadTooLarge()
                    .json(ErrorResponse::new("Upload exceeds the 32 MiB limit")));
            }
            data.extend_from_slice(&chunk);
        }
        if is_context {
            context = Some(String::from_utf8_lossy(&data).into_owned());
        } else if !data.is_empty() {
            images.push(data);
        }
    }

    if images.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("No image provided")));
    }

    let mut results = Vec::with_capacity(images.len());
    for image_data in &images {
        let options = AnalyzeOptions {
            context: context.clone(),
            advanced_mode: true,
        };
        match pipeline.analyze(image_data, options).await {
            Ok(response) => results.push(json!(response)),
            Err(e) => {
                error!("Food analysis failed: {}", e);
                results.push(json!(ErrorResponse::new(e.to_string())));
            }
        }
    }

    info!("Processed {} uploaded images", images.len());
    Ok(HttpResponse::Ok().json(json!({ "results": results })))
}

#[derive(Deserialize)]
struct NutritionQuery {
    context: Option<String>,
}

async fn get_nutrition(
    pipeline: web::Data<PipelineOrchestrator>,
    path: web::Path<String>,
    query: web::Query<NutritionQuery>,
) -> HttpResponse {
    let requested = path.into_inner();
    let food_name = pipeline.normalizer().normalize(&requested);
    let context = query
        .into_inner()
        .context
        .unwrap_or_else(|| crate::pipeline::DEFAULT_CONTEXT.to_string());

    let resolution = pipeline.resolver().resolve(&food_name, &context).await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "food_name": food_name,
        "nutrition": resolution.record,
        "source": resolution.source.as_str(),
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_food(
    pipeline: web::Data<PipelineOrchestrator>,
    query: web::Query<SearchQuery>,
) -> HttpResponse {
    let results: Vec<_> = pipeline
        .resolver()
        .dictionary()
        .search(&query.q, SEARCH_LIMIT)
        .into_iter()
        .map(|(food_name, nutrition)| json!({ "food_name": food_name, "nutrition": nutrition }))
        .collect();
    HttpResponse::Ok().json(json!({ "success": true, "results": results }))
}

async fn health(pipeline: web::Data<PipelineOrchestrator>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "classifiers": pipeline.backend_count(),
        "nutrition_providers": pipeline.resolver().provider_count(),
        "nutrition_foods": pipeline.resolver().dictionary().len(),
    }))
}
