// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `transport.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Sender that replays a fixed sequence of outcomes and counts calls.
    struct ScriptedSender {
        outcomes: Mutex<VecDeque<Result<u16, TransportError>>>,
        calls: Mutex<Vec<Option<Vec<u8>>>>,
    }

    impl ScriptedSender {
        fn new(outcomes: Vec<Result<u16, TransportError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RequestSender for ScriptedSender {
        async fn send(
            &self,
            _client: &reqwest::Client,
            request: &HttpRequest,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(request.body.clone());
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(code)) => Ok(HttpResponse {
                    status: StatusCode::from_u16(code).unwrap(),
                    body: String::new(),
                }),
                Some(Err(e)) => Err(e),
                None => panic!("unexpected extra request"),
            }
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(Method::POST, "https://rancher.example.com/v3/cluster").body("{}")
    }

    #[tokio::test]
    async fn test_5xx_is_retried_until_success() {
        let sender = ScriptedSender::new(vec![Ok(503), Ok(500), Ok(201)]);
        let client = reqwest::Client::new();

        let resp = send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(5))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(sender.call_count(), 3);
    }

    #[tokio::test]
    async fn test_every_attempt_resends_the_same_body() {
        let sender = ScriptedSender::new(vec![Ok(502), Ok(200)]);
        let client = reqwest::Client::new();

        send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap();

        let calls = sender.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0].as_deref(), Some(b"{}".as_slice()));
    }

    #[tokio::test]
    async fn test_4xx_is_not_retried() {
        let sender = ScriptedSender::new(vec![Ok(422)]);
        let client = reqwest::Client::new();

        let resp = send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(5))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_5xx_returns_last_response() {
        let sender = ScriptedSender::new(vec![Ok(500), Ok(500), Ok(503)]);
        let client = reqwest::Client::new();

        let resp = send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(sender.call_count(), 3);
    }

    #[tokio::test]
    async fn test_connect_errors_are_retried() {
        let sender = ScriptedSender::new(vec![
            Err(TransportError::Connect("dns lookup failed".into())),
            Err(TransportError::Timeout("deadline".into())),
            Ok(200),
        ]);
        let client = reqwest::Client::new();

        let resp = send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_other_transport_errors_fail_fast() {
        let sender = ScriptedSender::new(vec![Err(TransportError::Request("bad url".into()))]);
        let client = reqwest::Client::new();

        let err = send_with_retry(&sender, &client, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Request(_)));
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test]
    async fn test_reqwest_sender_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/cluster"))
            .and(header("authorization", "Bearer token-abc"))
            .and(body_string("{\"name\":\"c1\"}"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{\"id\":\"c-123\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let req = HttpRequest::new(Method::POST, format!("{}/v3/cluster", server.uri()))
            .header("Authorization", "Bearer token-abc")
            .body("{\"name\":\"c1\"}");
        let client = build_http_client(&[]).unwrap();

        let resp = ReqwestSender.send(&client, &req).await.unwrap();

        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.body, "{\"id\":\"c-123\"}");
    }

    #[test]
    fn test_retryable_transport_errors() {
        assert!(TransportError::Timeout(String::new()).is_retryable());
        assert!(TransportError::Connect(String::new()).is_retryable());
        assert!(!TransportError::Request(String::new()).is_retryable());
    }

    #[test]
    fn test_blank_ca_bundles_are_skipped() {
        assert!(build_http_client(&["", "  "]).is_ok());
    }

    #[tokio::test]
    async fn test_stalled_response_headers_time_out_before_overall_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/clusters"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(25)))
            .mount(&server)
            .await;

        let req = HttpRequest::new(Method::GET, format!("{}/v3/clusters", server.uri()));
        let client = build_http_client(&[]).unwrap();

        let start = std::time::Instant::now();
        let err = ReqwestSender.send(&client, &req).await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout(_)), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS));
    }
}
