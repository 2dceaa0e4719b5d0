//! HTTP routes for the prediction server.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use weathervane_model::PredictionResult;

use crate::error::ApiError;
use crate::state::SharedState;

/// Build the router with all prediction endpoints.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/models/available", get(models_available))
        .route("/model/load/{model_name}", post(model_load))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    /// Base64-encoded image bytes.
    image: String,
}

#[derive(Debug, Deserialize)]
struct BatchPredictRequest {
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    model_name: String,
    #[serde(flatten)]
    result: PredictionResult,
}

/// Service metadata and endpoint listing.
async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "weathervane prediction server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "GET /health",
            "model_info": "GET /model/info",
            "models_available": "GET /models/available",
            "model_load": "POST /model/load/{model_name}",
            "predict": "POST /predict",
            "predict_batch": "POST /predict/batch",
        },
    }))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.lock().await;
    let uptime = (chrono::Utc::now() - state.started_at()).num_seconds().max(0);
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "model_loaded": state.model_loaded(),
        "uptime_secs": uptime,
    }))
}

async fn model_info(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let state = state.lock().await;
    let predictor = state.predictor().ok_or(ApiError::NoModelLoaded)?;
    let metadata = predictor.metadata();

    Ok(Json(serde_json::json!({
        "model_name": predictor.model_name(),
        "architecture": metadata.architecture,
        "classes": metadata.classes,
        "input_size": metadata.input_size,
        "accuracy": metadata.accuracy,
        "loaded_at": predictor.loaded_at(),
    })))
}

async fn models_available(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let state = state.lock().await;
    let models = state.available_models()?;
    let current = state.predictor().map(|p| p.model_name().to_string());
    Ok(Json(serde_json::json!({
        "count": models.len(),
        "models": models,
        "current": current,
    })))
}

async fn model_load(
    State(state): State<SharedState>,
    Path(model_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut state = state.lock().await;
    state.load_model(&model_name)?;
    tracing::info!(model = model_name, "model switched");
    Ok(Json(serde_json::json!({
        "status": "loaded",
        "model_name": model_name,
    })))
}

async fn predict(
    State(state): State<SharedState>,
    Json(request): Json<PredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let predictor = {
        let state = state.lock().await;
        state.predictor_handle().ok_or(ApiError::NoModelLoaded)?
    };

    let bytes = decode_image(&request.image)?;
    let model_name = predictor.model_name().to_string();

    // The forward pass is CPU-bound; run it on the blocking pool so
    // the state lock and the async workers stay free.
    let result = tokio::task::spawn_blocking(move || predictor.predict_bytes(&bytes))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(PredictResponse { model_name, result }))
}

async fn predict_batch(
    State(state): State<SharedState>,
    Json(request): Json<BatchPredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (predictor, max) = {
        let state = state.lock().await;
        (state.predictor_handle(), state.config().max_batch_size)
    };

    if request.images.is_empty() {
        return Err(ApiError::BadRequest("no images provided".to_string()));
    }
    if request.images.len() > max {
        return Err(ApiError::BadRequest(format!(
            "batch size {} exceeds maximum of {max}",
            request.images.len()
        )));
    }

    let predictor = predictor.ok_or(ApiError::NoModelLoaded)?;

    let decoded: Result<Vec<Vec<u8>>, ApiError> =
        request.images.iter().map(|s| decode_image(s)).collect();
    let decoded = decoded?;
    let model_name = predictor.model_name().to_string();

    let results = tokio::task::spawn_blocking(move || {
        let slices: Vec<&[u8]> = decoded.iter().map(|b| b.as_slice()).collect();
        predictor.predict_batch(&slices)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(serde_json::json!({
        "model_name": model_name,
        "count": results.len(),
        "predictions": results,
    })))
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 image: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{shared, ServerState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use std::path::Path as FsPath;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use weathervane_core::config::{ServerConfig, TrainingConfig};
    use weathervane_core::WeatherClass;
    use weathervane_data::split::{DatasetSplits, SplitConfig};
    use weathervane_model::training::TrainingRunner;

    fn train_tiny_model(models: &FsPath) -> String {
        let data_dir = TempDir::new().unwrap();
        let mut samples = Vec::new();
        for (ci, class) in WeatherClass::ALL.iter().enumerate() {
            let dir = data_dir.path().join(class.as_str());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                let path = dir.join(format!("img_{i}.png"));
                let shade = (ci * 40) as u8;
                image::RgbImage::from_pixel(16, 16, image::Rgb([shade, shade, shade]))
                    .save(&path)
                    .unwrap();
                samples.push((path, *class));
            }
        }

        let splits = DatasetSplits::stratified(
            samples,
            SplitConfig {
                val_fraction: 0.0,
                test_fraction: 0.5,
                seed: 42,
            },
        )
        .unwrap();

        let config = TrainingConfig {
            architecture: "cnn_lite".to_string(),
            epochs: 1,
            batch_size: 4,
            learning_rate: 1e-3,
            image_size: 16,
            dropout: 0.0,
            seed: 42,
            val_split: 0.0,
            test_split: 0.5,
        };
        let runner =
            TrainingRunner::new(models.to_path_buf(), models.join("artifacts"), config);
        runner.run(&splits).unwrap().model_name
    }

    fn png_base64(value: u8) -> String {
        let img = image::RgbImage::from_pixel(20, 20, image::Rgb([value, value, value]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        BASE64.encode(bytes)
    }

    fn empty_app(models: &FsPath) -> Router {
        router(shared(ServerState::empty(
            models.to_path_buf(),
            ServerConfig::default(),
        )))
    }

    fn loaded_app(models: &FsPath) -> Router {
        router(shared(
            ServerState::new(models.to_path_buf(), ServerConfig::default()).unwrap(),
        ))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = ServiceExt::<Request<Body>>::oneshot(app, req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(empty_app(dir.path()), get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "weathervane prediction server");
    }

    #[tokio::test]
    async fn test_health_without_model() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(empty_app(dir.path()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_model_info_without_model() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(empty_app(dir.path()), get_req("/model/info")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "no model loaded");
    }

    #[tokio::test]
    async fn test_predict_without_model() {
        let dir = TempDir::new().unwrap();
        let req = post_json("/predict", serde_json::json!({ "image": png_base64(50) }));
        let (status, _) = send(empty_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_models_available_empty() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(empty_app(dir.path()), get_req("/models/available")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn test_load_unknown_model() {
        let dir = TempDir::new().unwrap();
        let req = post_json("/model/load/ghost", serde_json::json!({}));
        let (status, _) = send(empty_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_startup_loads_latest_and_predicts() {
        let dir = TempDir::new().unwrap();
        let name = train_tiny_model(dir.path());
        let app = loaded_app(dir.path());

        let (status, json) = send(app.clone(), get_req("/model/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model_name"], name);

        let req = post_json("/predict", serde_json::json!({ "image": png_base64(120) }));
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model_name"], name);
        assert!(WeatherClass::names()
            .contains(&json["predicted_class"].as_str().unwrap_or_default().to_string()));
        assert!(json["confidence"].as_f64().unwrap_or(0.0) > 0.0);
    }

    #[tokio::test]
    async fn test_explicit_model_load() {
        let dir = TempDir::new().unwrap();
        let name = train_tiny_model(dir.path());
        let app = empty_app(dir.path());

        let req = post_json(&format!("/model/load/{name}"), serde_json::json!({}));
        let (status, json) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "loaded");

        let (status, json) = send(app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model_loaded"], true);
    }

    #[tokio::test]
    async fn test_predict_invalid_base64() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let req = post_json("/predict", serde_json::json!({ "image": "!!not-base64!!" }));
        let (status, _) = send(loaded_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_predict_undecodable_image() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let garbage = BASE64.encode(b"definitely not a picture");
        let req = post_json("/predict", serde_json::json!({ "image": garbage }));
        let (status, _) = send(loaded_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_predict() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let req = post_json(
            "/predict/batch",
            serde_json::json!({ "images": [png_base64(30), png_base64(220)] }),
        );
        let (status, json) = send(loaded_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["predictions"].as_array().map(|a| a.len()), Some(2));
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let images: Vec<String> = (0..11).map(|i| png_base64(i * 20)).collect();
        let req = post_json("/predict/batch", serde_json::json!({ "images": images }));
        let (status, json) = send(loaded_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap_or_default()
            .contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_health_answers_alongside_batch_predict() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let app = loaded_app(dir.path());

        let batch = post_json(
            "/predict/batch",
            serde_json::json!({ "images": [png_base64(15), png_base64(90), png_base64(180)] }),
        );
        let ((batch_status, batch_json), (health_status, _)) =
            tokio::join!(send(app.clone(), batch), send(app, get_req("/health")));

        assert_eq!(batch_status, StatusCode::OK);
        assert_eq!(batch_json["count"], 3);
        assert_eq!(health_status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let dir = TempDir::new().unwrap();
        train_tiny_model(dir.path());
        let req = post_json("/predict/batch", serde_json::json!({ "images": [] }));
        let (status, _) = send(loaded_app(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
