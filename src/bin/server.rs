use actix_cors::Cors;
use actix_web::{error::BlockingError, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use emicast::{
    args::Args, config::EmicastConfig, error::EmicastError, logging::setup_tracing,
    state::SessionState,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::error;

struct AppState {
    config: EmicastConfig,
    session: Arc<Mutex<SessionState>>,
}

const DEFAULT_EPOCHS: i64 = 100;
const DEFAULT_BATCH_SIZE: i64 = 32;

#[derive(Debug, Deserialize)]
struct TrainRequest {
    epochs: Option<i64>,
    #[serde(rename = "batchSize")]
    batch_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    #[serde(rename = "inputData")]
    input_data: Option<Vec<Vec<f64>>>,
    #[serde(rename = "generateFuture", default)]
    generate_future: bool,
    #[serde(rename = "futureYears")]
    future_years: Option<i64>,
}

fn error_response(e: &EmicastError) -> HttpResponse {
    let body = json!({ "error": e.to_string() });
    if e.is_client_error() {
        HttpResponse::BadRequest().json(body)
    } else {
        error!("Request failed: {}", e);
        HttpResponse::InternalServerError().json(body)
    }
}

fn respond<T: serde::Serialize>(
    result: Result<Result<T, EmicastError>, BlockingError>,
) -> HttpResponse {
    match result {
        Ok(Ok(output)) => HttpResponse::Ok().json(output),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("Blocking task failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "internal error" }))
        }
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

async fn get_data(state: web::Data<AppState>) -> impl Responder {
    let state = state.clone();
    let result = web::block(move || {
        let mut session = state.session.lock().unwrap();
        session.load_data(&state.config)
    })
    .await;
    respond(result)
}

async fn train(state: web::Data<AppState>, body: web::Json<TrainRequest>) -> impl Responder {
    let epochs = body.epochs.unwrap_or(DEFAULT_EPOCHS);
    let batch_size = body.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if epochs <= 0 || batch_size <= 0 {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "epochs and batchSize must be positive integers" }));
    }

    let state = state.clone();
    let result = web::block(move || {
        let mut session = state.session.lock().unwrap();
        session.train(&state.config, epochs as usize, batch_size as usize)
    })
    .await;
    respond(result)
}

async fn predict(state: web::Data<AppState>, body: web::Json<PredictRequest>) -> impl Responder {
    let body = body.into_inner();
    // A negative horizon yields an empty forecast, not an error
    let future_years = body.future_years.map(|y| y.max(0) as usize);

    let state = state.clone();
    let result = web::block(move || {
        let mut session = state.session.lock().unwrap();
        session.predict(
            &state.config,
            body.input_data.as_deref(),
            body.generate_future,
            future_years,
        )
    })
    .await;
    respond(result)
}

async fn model_info(state: web::Data<AppState>) -> impl Responder {
    let state = state.clone();
    let result = web::block(move || {
        let mut session = state.session.lock().unwrap();
        session.model_info(&state.config)
    })
    .await;
    respond(result)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let _guard = setup_tracing(Some(&args.log_dir)).expect("Failed to set up tracing");

    let config = EmicastConfig::read_config(Some(&args.config)).expect("Failed to load config");
    let port = args.port.unwrap_or(config.port);

    let app_state = web::Data::new(AppState {
        config,
        session: Arc::new(Mutex::new(SessionState::new())),
    });

    tracing::info!("Server listening on 0.0.0.0:{}", port);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(app_state.clone())
            .route("/health", web::get().to(health))
            .route("/api/data", web::get().to(get_data))
            .route("/api/train", web::post().to(train))
            .route("/api/predict", web::post().to(predict))
            .route("/api/model-info", web::get().to(model_info))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
