use crate::errors::RelayError;
use crate::relay::{FilePart, UploadForm, UploadRelay, UploadResult};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State, multipart::Field},
    http::{
        HeaderValue, Method, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
    },
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::BytesMut;
use serde::Serialize;
use std::sync::Arc;

/// Routes upload requests to the relay. Every path is accepted so the relay
/// can sit behind a bare worker URL or any route prefix, and so that every
/// response, including preflights, carries CORS headers.
pub fn router(relay: Arc<UploadRelay>) -> Router {
    Router::new()
        .route("/", any(upload))
        .route("/upload", any(upload))
        .fallback(upload)
        // The relay enforces its own limit while streaming the file part
        .layer(DefaultBodyLimit::disable())
        .with_state(relay)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    message_id: i64,
    file_id: String,
    file_name: String,
}

impl From<UploadResult> for UploadResponse {
    fn from(result: UploadResult) -> Self {
        UploadResponse {
            success: true,
            message_id: result.message_id,
            file_id: result.file_id,
            file_name: result.file_name,
        }
    }
}

impl IntoResponse for UploadResponse {
    fn into_response(self) -> Response {
        with_cors((StatusCode::OK, Json(self)).into_response())
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorResponse {
            error: self.to_string(),
        });
        with_cors((self.status_code(), body).into_response())
    }
}

// Callers are browsers on arbitrary origins; every response must be readable.
fn with_cors(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn preflight() -> Response {
    let mut response = with_cors(StatusCode::OK.into_response());
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

async fn upload(State(relay): State<Arc<UploadRelay>>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight();
    }
    if request.method() != Method::POST {
        return relay.reject(RelayError::MethodNotAllowed).into_response();
    }

    let form: Result<UploadForm, RelayError> = async {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| RelayError::InvalidMultipart(e.body_text()))?;
        read_form(multipart, relay.max_upload_size()).await
    }
    .await;

    let result = match form {
        Ok(form) => relay.handle(form).await,
        Err(err) => Err(relay.reject(err)),
    };

    match result {
        Ok(result) => UploadResponse::from(result).into_response(),
        Err(err) => err.into_response(),
    }
}

fn invalid_multipart(err: axum::extract::multipart::MultipartError) -> RelayError {
    RelayError::InvalidMultipart(err.body_text())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

async fn read_form(mut multipart: Multipart, max_upload_size: u64) -> Result<UploadForm, RelayError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            "file" if form.file.is_none() => {
                form.file = Some(read_file_part(field, max_upload_size).await?);
            }
            "subjectId" => {
                form.subject_id = non_empty(field.text().await.map_err(invalid_multipart)?);
            }
            // Older clients send the subject as `userId`
            "userId" => {
                let user_id = non_empty(field.text().await.map_err(invalid_multipart)?);
                if form.subject_id.is_none() {
                    form.subject_id = user_id;
                }
            }
            "authToken" => {
                form.auth_token = non_empty(field.text().await.map_err(invalid_multipart)?);
            }
            "fileName" => {
                form.file_name = non_empty(field.text().await.map_err(invalid_multipart)?);
            }
            _ => tracing::debug!(field = %name, "Ignoring multipart field"),
        }
    }

    Ok(form)
}

// Counts every byte of the part but stops buffering once the limit is crossed,
// so an oversized upload costs bandwidth but not memory.
async fn read_file_part(mut field: Field<'_>, max_upload_size: u64) -> Result<FilePart, RelayError> {
    let file_name = field.file_name().and_then(|n| non_empty(n.to_owned()));
    let content_type = field.content_type().map(str::to_owned);

    let mut data = BytesMut::new();
    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(invalid_multipart)? {
        size += chunk.len() as u64;
        if size <= max_upload_size {
            data.extend_from_slice(&chunk);
        } else if !data.is_empty() {
            data = BytesMut::new();
        }
    }

    Ok(FilePart {
        file_name,
        content_type,
        size,
        data: data.freeze(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_UPLOAD_SIZE;
    use crate::credentials::Credentials;
    use crate::testutils::{CountingRecorder, MultipartBuilder, SpyResolver, SpySender};
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use axum::http::header::CONTENT_TYPE;
    use tower::ServiceExt;

    fn app(resolver: &Arc<SpyResolver>, sender: &Arc<SpySender>, max_upload_size: u64) -> Router {
        router(Arc::new(UploadRelay::new(
            resolver.clone(),
            sender.clone(),
            max_upload_size,
        )))
    }

    fn photo_reply() -> serde_json::Value {
        serde_json::json!({
            "ok": true,
            "result": {"message_id": 314, "photo": [{"file_id": "AgACAgQ"}, {"file_id": "AgACAgX"}]}
        })
    }

    fn post(uri: &str, builder: MultipartBuilder) -> Request {
        let (content_type, body) = builder.build();
        HttpRequest::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = HttpRequest::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = HttpRequest::builder()
            .method(Method::GET)
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(json_body(response).await["error"], "Method not allowed");
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_preflight_on_any_path() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = HttpRequest::builder()
            .method(Method::OPTIONS)
            .uri("/worker")
            .body(Body::empty())
            .unwrap();
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
    }

    #[tokio::test]
    async fn test_upload_on_any_path() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post(
            "/api/worker/upload",
            MultipartBuilder::new()
                .file("file", "a.jpg", "image/jpeg", b"jpeg")
                .text("authToken", "tok"),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["fileId"], "AgACAgQ");
        assert_eq!(sender.calls(), 1);

        let request = HttpRequest::builder()
            .method(Method::GET)
            .uri("/favicon.ico")
            .body(Body::empty())
            .unwrap();
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_early_rejections_are_counted() {
        let recorder = CountingRecorder::default();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = HttpRequest::builder()
            .method(Method::GET)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        let request = HttpRequest::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(recorder.counter("upload.requests", &[]), 2);
        assert_eq!(
            recorder.counter("upload.rejected", &[("reason", "method_not_allowed")]),
            1
        );
        assert_eq!(
            recorder.counter("upload.rejected", &[("reason", "invalid_multipart")]),
            1
        );
    }

    #[tokio::test]
    async fn test_end_to_end_photo_upload() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-100123", "1:tok")));
        let sender = Arc::new(SpySender::replying(photo_reply()));
        let image = vec![0xAB_u8; 10 * 1024 * 1024];

        let request = post(
            "/",
            MultipartBuilder::new()
                .file("file", "photo.jpg", "image/jpeg", &image)
                .text("subjectId", "u1")
                .text("authToken", "session-token"),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "success": true,
                "messageId": 314,
                "fileId": "AgACAgQ",
                "fileName": "photo.jpg"
            })
        );
        assert_eq!(resolver.calls(), 1);
        assert_eq!(sender.calls(), 1);

        let (_, document) = sender.last_request().unwrap();
        assert_eq!(document.data.len(), image.len());
    }

    #[tokio::test]
    async fn test_legacy_user_id_and_file_name_override() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post(
            "/upload",
            MultipartBuilder::new()
                .text("userId", "legacy-user")
                .text("authToken", "tok")
                .text("fileName", "holiday.jpg")
                .file("file", "IMG_0001.jpg", "image/jpeg", b"jpeg"),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["fileName"], "holiday.jpg");
        assert_eq!(resolver.last_subject().as_deref(), Some("legacy-user"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post("/", MultipartBuilder::new().text("authToken", "tok"));
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(json_body(response).await["error"], "No file provided");
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_auth_token_is_missing() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post(
            "/",
            MultipartBuilder::new()
                .file("file", "a.txt", "text/plain", b"abc")
                .text("authToken", ""),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Auth token required");
        assert_eq!(resolver.calls(), 0);
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_is_drained_and_rejected() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post(
            "/",
            MultipartBuilder::new()
                .file("file", "big.bin", "application/octet-stream", &[7u8; 64])
                .text("authToken", "tok"),
        );
        let response = app(&resolver, &sender, 16).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            json_body(response).await["error"],
            "File too large (64 bytes, max 16 bytes)"
        );
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(
            json_body(response).await["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid multipart body")
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_description_reaches_client() {
        let resolver = Arc::new(SpyResolver::with(Credentials::new("-1", "t")));
        let sender = Arc::new(SpySender::replying(
            serde_json::json!({"ok": false, "description": "blocked"}),
        ));

        let request = post(
            "/",
            MultipartBuilder::new()
                .file("file", "a.txt", "text/plain", b"abc")
                .text("authToken", "tok"),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("blocked"));
        assert!(body.get("success").is_none());
    }

    #[tokio::test]
    async fn test_credential_failure() {
        let resolver = Arc::new(SpyResolver::failing());
        let sender = Arc::new(SpySender::replying(photo_reply()));

        let request = post(
            "/",
            MultipartBuilder::new()
                .file("file", "a.txt", "text/plain", b"abc")
                .text("authToken", "tok"),
        );
        let response = app(&resolver, &sender, MAX_UPLOAD_SIZE)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to fetch credentials")
        );
        assert_eq!(sender.calls(), 0);
    }
}
