use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("unsupported url {0}: {1}")]
  UnsupportedURL(String, &'static str),
  #[error("invalid resolution: {0}")]
  InvalidResolution(String),
  #[error("extraction failed: {0}")]
  Extraction(String),
  #[error("File not found")]
  FileNotFound,
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),
  #[error("malformed extractor output: {0}")]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  fn status(&self) -> StatusCode {
    match self {
      Error::UnsupportedURL(..) | Error::InvalidResolution(_) => {
        StatusCode::BAD_REQUEST
      }
      Error::FileNotFound => StatusCode::NOT_FOUND,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("request failed: {}", self);
    }

    let body = serde_json::json!({ "detail": self.to_string() });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod test {
  use axum::body::HttpBody;

  use super::*;

  async fn reply(err: Error) -> (StatusCode, serde_json::Value) {
    let resp = err.into_response();
    let status = resp.status();
    let mut body = resp.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
      bytes.extend_from_slice(&chunk.unwrap());
    }
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn test_status_mapping() {
    let (status, body) =
      reply(Error::UnsupportedURL("ftp://x".into(), "not http")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
      body,
      serde_json::json!({ "detail": "unsupported url ftp://x: not http" })
    );

    let (status, body) = reply(Error::InvalidResolution("tall".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "invalid resolution: tall");

    let (status, body) = reply(Error::FileNotFound).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, serde_json::json!({ "detail": "File not found" }));

    let (status, body) =
      reply(Error::Extraction("ERROR: video unavailable".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      body["detail"],
      "extraction failed: ERROR: video unavailable"
    );
  }
}
