use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::env;
use std::sync::Arc;

use foodvision::cache::CacheStore;
use foodvision::cache::cache_service::PredictionCache;
use foodvision::cache::dynamodb_store::DynamoDbCacheStore;
use foodvision::cache::file_store::FileCacheStore;
use foodvision::classifier::build_backends;
use foodvision::config::{AppConfig, CacheBackend};
use foodvision::nutrition::{NutritionDictionary, NutritionResolver, build_provider_chain};
use foodvision::pipeline::PipelineOrchestrator;
use foodvision::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(e)
    })?;

    let http_client = reqwest::Client::new();

    let backends = build_backends(&config.pipeline, &http_client);
    if backends.is_empty() {
        log::error!("No classifier backend could be started");
        return Err(std::io::Error::other("no classifier backends available"));
    }

    let dictionary = Arc::new(NutritionDictionary::load(
        &config.nutrition_data_path,
        &config.nutrition_cache_path,
    ));
    let chain = build_provider_chain(&config.pipeline.providers, &config.api_keys, &http_client);
    let resolver = Arc::new(NutritionResolver::new(dictionary, chain));

    let store: Arc<dyn CacheStore> = match &config.cache_backend {
        CacheBackend::File { dir } => {
            log::info!("Prediction cache stored under {}", dir.display());
            Arc::new(FileCacheStore::new(dir.clone()))
        }
        CacheBackend::DynamoDb { table } => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            log::info!("Prediction cache stored in DynamoDB table {}", table);
            Arc::new(DynamoDbCacheStore::new(
                DynamoDbClient::new(&aws_config),
                table.clone(),
            ))
        }
    };
    let cache = Arc::new(PredictionCache::new(
        Some(store),
        config.pipeline.cache_ttl(),
    ));

    let pipeline = web::Data::new(PipelineOrchestrator::new(
        &config.pipeline,
        backends,
        cache,
        resolver,
    ));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
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
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
