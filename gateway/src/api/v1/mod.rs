pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod response;
pub mod router;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::routes::create_router;
    use crate::api::state::AppState;
    use crate::config::{
        Config, HistoryConfig, OcrConfig, PoolScope, ServerConfig, WorkersConfig,
    };
    use crate::error::Result;
    use crate::ocr::{RecognizedText, Recognizer};

    struct UpperRecognizer;

    #[async_trait]
    impl Recognizer for UpperRecognizer {
        async fn recognize(&self, image: &[u8]) -> Result<RecognizedText> {
            Ok(RecognizedText::Plain(
                String::from_utf8_lossy(image).to_uppercase(),
            ))
        }

        fn name(&self) -> &str {
            "upper"
        }
    }

    struct LowerRecognizer;

    #[async_trait]
    impl Recognizer for LowerRecognizer {
        async fn recognize(&self, image: &[u8]) -> Result<RecognizedText> {
            Ok(RecognizedText::Plain(
                String::from_utf8_lossy(image).to_lowercase(),
            ))
        }

        fn name(&self) -> &str {
            "lower"
        }
    }

    fn test_config(api_keys: Vec<String>) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                api_keys,
                max_concurrent_requests: 2,
            },
            workers: WorkersConfig {
                max_workers: 2,
                pool_scope: PoolScope::Shared,
                batch_timeout_secs: 0,
            },
            ocr: OcrConfig {
                max_images_per_request: 2,
                ..OcrConfig::default()
            },
            history: HistoryConfig {
                ttl_secs: 3600,
                cleanup_interval_secs: 600,
            },
        }
    }

    fn test_state(api_keys: Vec<String>) -> AppState {
        AppState::with_recognizer(test_config(api_keys), Arc::new(UpperRecognizer), true)
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const BOUNDARY: &str = "gateway-test-boundary";

    fn multipart_body(files: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn ocr_request(files: &[(&str, &str, &str)]) -> Request<Body> {
        ocr_request_to("/api/v1/ocr", files)
    }

    fn ocr_request_to(uri: &str, files: &[(&str, &str, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap()
    }

    #[tokio::test]
    async fn protected_route_requires_auth() {
        let app = create_router(test_state(vec!["test-key".to_string()]));

        let response = app
            .oneshot(ocr_request(&[("images", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "unauthorized");
        assert_eq!(json["error"]["message"], "Missing authorization header");
    }

    #[tokio::test]
    async fn protected_route_rejects_invalid_key() {
        let app = create_router(test_state(vec!["test-key".to_string()]));

        let mut request = ocr_request(&[("images", "a.png", "abc")]);
        request
            .headers_mut()
            .insert("Authorization", "Bearer wrong".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn no_keys_configured_leaves_routes_open() {
        let app = create_router(test_state(vec![]));

        let response = app
            .oneshot(ocr_request(&[("images", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ocr_returns_batch_in_upload_order() {
        let app = create_router(test_state(vec!["k".to_string()]));

        let mut request = ocr_request(&[
            ("images", "first.png", "one"),
            ("other", "ignored.png", "zzz"),
            ("images", "second.gif", "two"),
        ]);
        request
            .headers_mut()
            .insert("Authorization", "Bearer k".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let data = &json["data"];
        assert_eq!(data["total_images"], 2);
        assert_eq!(data["successful"], 1);
        assert_eq!(data["failed"], 1);
        assert_eq!(data["results"][0]["filename"], "first.png");
        assert_eq!(data["results"][0]["text"], "ONE");
        assert_eq!(data["results"][1]["filename"], "second.gif");
        assert_eq!(data["results"][1]["text"], "");
        assert_eq!(data["results"][1]["error"], "unsupported format: gif");
    }

    #[tokio::test]
    async fn ocr_without_images_is_rejected() {
        let app = create_router(test_state(vec![]));

        let response = app
            .oneshot(ocr_request(&[("other", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "invalid_request");
        assert_eq!(json["error"]["message"], "no images provided");
    }

    #[tokio::test]
    async fn ocr_with_too_many_images_is_rejected() {
        let app = create_router(test_state(vec![]));

        let response = app
            .oneshot(ocr_request(&[
                ("images", "a.png", "a"),
                ("images", "b.png", "b"),
                ("images", "c.png", "c"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "maximum 2 images allowed, got 3");
    }

    #[tokio::test]
    async fn saturated_server_answers_too_many_requests() {
        let state = test_state(vec![]);
        let _first = Arc::clone(&state.request_slots).try_acquire_owned().unwrap();
        let _second = Arc::clone(&state.request_slots).try_acquire_owned().unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(ocr_request(&[("images", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "too_many_requests");
    }

    #[tokio::test]
    async fn request_slot_is_released_after_response() {
        let state = test_state(vec![]);
        let slots = Arc::clone(&state.request_slots);
        let app = create_router(state);

        let response = app
            .oneshot(ocr_request(&[("images", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(slots.available_permits(), 2);
    }

    fn two_backend_state(gemini_auth_key: Option<&str>) -> AppState {
        let mut config = test_config(vec![]);
        config.ocr.gemini_auth_key = gemini_auth_key.map(String::from);
        AppState::with_recognizer(config, Arc::new(UpperRecognizer), true)
            .unwrap()
            .with_backend("gemini/gemini-2.5-pro", Arc::new(LowerRecognizer), true)
    }

    #[tokio::test]
    async fn provider_route_picks_the_named_backend() {
        let app = create_router(two_backend_state(None));

        let response = app
            .clone()
            .oneshot(ocr_request_to("/api/v1/ocr/Gemini", &[("images", "a.png", "MiXeD")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["results"][0]["text"], "mixed");

        // The default backend answers both the bare route and its own name.
        for uri in ["/api/v1/ocr", "/api/v1/ocr/local"] {
            let response = app
                .clone()
                .oneshot(ocr_request_to(uri, &[("images", "a.png", "MiXeD")]))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let json = body_json(response).await;
            assert_eq!(json["data"]["results"][0]["text"], "MIXED", "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_provider_route_is_not_found() {
        let app = create_router(two_backend_state(None));

        let response = app
            .oneshot(ocr_request_to("/api/v1/ocr/yandex", &[("images", "a.png", "abc")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "unknown OCR backend: yandex");
    }

    #[tokio::test]
    async fn gemini_backend_checks_its_own_key() {
        let app = create_router(two_backend_state(Some("g-key")));

        for key in [None, Some("wrong")] {
            let mut request = ocr_request_to("/api/v1/ocr/gemini", &[("images", "a.png", "abc")]);
            if let Some(key) = key {
                request
                    .headers_mut()
                    .insert("X-Gemini-API-Key", key.parse().unwrap());
            }
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{key:?}");
            let json = body_json(response).await;
            assert_eq!(json["error"]["message"], "Invalid or missing authentication key");
        }

        let mut request = ocr_request_to("/api/v1/ocr/gemini", &[("images", "a.png", "ABC")]);
        request
            .headers_mut()
            .insert("X-Gemini-API-Key", "g-key".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Other backends ignore the gemini key.
        let response = app
            .oneshot(ocr_request(&[("images", "a.png", "abc")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn backends_share_one_worker_pool() {
        let state = two_backend_state(None);
        let default = state.default_backend().batch.pool().clone();
        let gemini = state.backend("gemini").unwrap().batch.pool().clone();

        let _permit = default.acquire().await.unwrap();
        assert_eq!(gemini.available(), default.capacity() - 1);
    }

    #[tokio::test]
    async fn health_lists_every_backend() {
        let app = create_router(two_backend_state(None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        let backends = &json["data"]["backends"];
        assert_eq!(backends[0]["name"], "local");
        assert_eq!(backends[1]["name"], "gemini");
        assert_eq!(backends[1]["model"], "gemini/gemini-2.5-pro");
        assert_eq!(backends[1]["status"], "available");
    }

    #[tokio::test]
    async fn history_requires_client_id() {
        let app = create_router(test_state(vec![]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "invalid_request");
        assert_eq!(json["error"]["message"], "X-Client-ID header is required");
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = create_router(test_state(vec!["secret".to_string()]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["ocr"]["provider"], "upper");
        assert_eq!(json["data"]["ocr"]["status"], "available");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn ready_reflects_backend_availability() {
        let state = AppState::with_recognizer(test_config(vec![]), Arc::new(UpperRecognizer), false)
            .unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["data"]["ready"], false);
    }

    #[tokio::test]
    async fn openapi_json_is_public_and_valid() {
        let app = create_router(test_state(vec!["secret".to_string()]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let version = json["openapi"]
            .as_str()
            .expect("openapi field should be a string");
        assert!(
            version.starts_with('3'),
            "OpenAPI version should start with 3, got: {version}"
        );
    }
}
