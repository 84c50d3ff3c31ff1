// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/api.rs - HTTP 接口
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{fmt::Display, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  body::Bytes,
  extract::{DefaultBodyLimit, State, rejection::BytesRejection},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_http::{
  cors::{Any, CorsLayer},
  services::ServeDir,
};
use tracing::{error, info, warn};

use crate::{
  alert::AlertRecord,
  input::decode_data_url,
  model::{DetectResult, Model},
  upload::{Swachhta, UploadError, UploadSummary},
};

const HOME_TEXT: &str =
  "Swachhta Dashboard Backend is Running! Use /upload endpoint for image processing.";

/// 错误响应。上传接口用 `error` 字段，其余接口用 `message` 字段。
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  key: &'static str,
  message: String,
}

impl ApiError {
  fn message<S: Into<String>>(status: StatusCode, message: S) -> Self {
    ApiError {
      status,
      key: "message",
      message: message.into(),
    }
  }

  fn upload<S: Into<String>>(status: StatusCode, message: S) -> Self {
    ApiError {
      status,
      key: "error",
      message: message.into(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from("error"));
    body.insert(self.key.to_string(), Value::from(self.message));
    (self.status, Json(Value::Object(body))).into_response()
  }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub struct ApiState<M> {
  service: Arc<Swachhta<M>>,
  max_body_bytes: usize,
}

impl<M> Clone for ApiState<M> {
  fn clone(&self) -> Self {
    ApiState {
      service: Arc::clone(&self.service),
      max_body_bytes: self.max_body_bytes,
    }
  }
}

#[derive(Deserialize)]
struct UploadRequest {
  image: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
  status: &'static str,
  #[serde(flatten)]
  summary: UploadSummary,
}

#[derive(Serialize)]
struct AlertsResponse {
  status: &'static str,
  alerts: Vec<AlertRecord>,
}

#[derive(Deserialize)]
struct DeleteRequest {
  timestamp: String,
}

/// 构建路由：接口、`/uploads` 静态文件、请求体上限与 CORS
pub fn router<M>(service: Arc<Swachhta<M>>, max_body_bytes: usize) -> Router
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: Display,
{
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any)
    .max_age(Duration::from_secs(3600));

  let upload_dir = service.upload_dir().to_path_buf();
  let state = ApiState {
    service,
    max_body_bytes,
  };

  Router::new()
    .route("/", get(home))
    .route("/health", get(health))
    .route("/upload", post(upload::<M>))
    .route("/alerts/list", get(list_alerts::<M>))
    .route("/alerts/delete", post(delete_alert::<M>))
    .with_state(state)
    .nest_service("/uploads", ServeDir::new(upload_dir))
    .layer(DefaultBodyLimit::max(max_body_bytes))
    .layer(cors)
}

/// 绑定地址并运行，收到 Ctrl-C 后退出
pub async fn serve<M>(
  addr: SocketAddr,
  service: Swachhta<M>,
  max_body_bytes: usize,
) -> anyhow::Result<()>
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: Display,
{
  let app = router(Arc::new(service), max_body_bytes);

  info!("API 服务监听于 {}", addr);
  axum::Server::bind(&addr)
    .serve(app.into_make_service())
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        error!("监听中断信号失败: {}", e);
      }
      warn!("收到中断信号，准备退出...");
    })
    .await?;

  info!("服务已停止");
  Ok(())
}

async fn home() -> &'static str {
  HOME_TEXT
}

async fn health() -> Json<Value> {
  Json(json!({ "status": "ok", "message": "Server is running" }))
}

fn is_json_content(headers: &HeaderMap) -> bool {
  headers
    .get(header::CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .map(|value| {
      let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
      mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
    })
    .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
  headers
    .get(header::CONTENT_LENGTH)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.parse().ok())
}

async fn run_blocking<T, F>(f: F) -> Result<T, tokio::task::JoinError>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f).await
}

async fn upload<M>(
  State(state): State<ApiState<M>>,
  headers: HeaderMap,
  body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<UploadResponse>>
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: Display,
{
  let too_large = || ApiError::upload(StatusCode::PAYLOAD_TOO_LARGE, "File too large");

  if declared_length(&headers).is_some_and(|len| len > state.max_body_bytes) {
    warn!("请求体过大");
    return Err(too_large());
  }

  let body = body.map_err(|rejection| {
    let status = rejection.into_response().status();
    warn!("读取请求体失败: {}", status);
    if status == StatusCode::PAYLOAD_TOO_LARGE {
      too_large()
    } else {
      ApiError::upload(StatusCode::BAD_REQUEST, "Bad request")
    }
  })?;

  if body.is_empty() {
    warn!("请求体为空");
    return Err(ApiError::upload(StatusCode::BAD_REQUEST, "Empty request"));
  }

  if !is_json_content(&headers) {
    warn!("Content-Type 不是 application/json");
    return Err(ApiError::upload(
      StatusCode::BAD_REQUEST,
      "Content-Type must be application/json",
    ));
  }

  let data_url = serde_json::from_slice::<UploadRequest>(&body)
    .ok()
    .and_then(|request| request.image)
    .ok_or_else(|| {
      warn!("没有收到图像数据");
      ApiError::upload(StatusCode::BAD_REQUEST, "No image data received")
    })?;

  let image_bytes = decode_data_url(&data_url).map_err(|e| {
    warn!("图像数据解码失败: {}", e);
    ApiError::upload(StatusCode::BAD_REQUEST, "Failed to decode image")
  })?;

  let service = Arc::clone(&state.service);
  let summary = run_blocking(move || service.handle_upload(&image_bytes))
    .await
    .map_err(|e| {
      error!("上传处理任务失败: {}", e);
      ApiError::upload(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Image processing failed: {}", e),
      )
    })?
    .map_err(|e| match e {
      UploadError::DecodeError(_) => {
        ApiError::upload(StatusCode::BAD_REQUEST, "Invalid image data")
      }
      UploadError::PersistError(_) => {
        ApiError::upload(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save image")
      }
    })?;

  Ok(Json(UploadResponse {
    status: "success",
    summary,
  }))
}

async fn list_alerts<M>(State(state): State<ApiState<M>>) -> ApiResult<Json<AlertsResponse>>
where
  M: Send + Sync + 'static,
{
  let service = Arc::clone(&state.service);
  let alerts = run_blocking(move || service.alerts().list_all())
    .await
    .map_err(|e| {
      error!("读取告警任务失败: {}", e);
      ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?
    .map_err(|e| {
      error!("读取告警失败: {}", e);
      ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

  Ok(Json(AlertsResponse {
    status: "success",
    alerts,
  }))
}

async fn delete_alert<M>(State(state): State<ApiState<M>>, body: Bytes) -> ApiResult<Json<Value>>
where
  M: Send + Sync + 'static,
{
  let request: DeleteRequest = serde_json::from_slice(&body).map_err(|e| {
    warn!("删除请求无效: {}", e);
    ApiError::message(StatusCode::BAD_REQUEST, "Invalid request data")
  })?;

  let service = Arc::clone(&state.service);
  run_blocking(move || service.alerts().delete_by_timestamp(&request.timestamp))
    .await
    .map_err(|e| {
      error!("删除告警任务失败: {}", e);
      ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?
    .map_err(|e| {
      error!("删除告警失败: {}", e);
      ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

  Ok(Json(json!({
    "status": "success",
    "message": "Alert deleted successfully"
  })))
}
