//! Local HTTP gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use membrane_core::{
    Event, EventAck, FromCanonical, MembraneError, ToCanonical, Trigger, TriggerOutcome, Worker,
};
use membrane_plugins::GatewayService;
use membrane_pool::WorkerPool;
use membrane_protocol::MAX_FRAME_LENGTH;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Header that marks a `POST /topic/{name}` request as an event.
pub const TRIGGER_HEADER: &str = "x-membrane-trigger";

/// Largest request body the gateway accepts.
///
/// Bodies travel base64-encoded, so this keeps a request with ordinary
/// headers inside one [`MAX_FRAME_LENGTH`] wire frame.
pub const MAX_BODY_BYTES: usize = MAX_FRAME_LENGTH / 4 * 3 - 64 * 1024;

const TOPIC_PREFIX: &str = "/topic/";

/// Gateway serving local HTTP traffic.
///
/// Every request is forwarded to a worker as an HTTP trigger, except
/// `POST /topic/{name}` carrying `x-membrane-trigger: event`, which is
/// delivered as an event on `name`.
pub struct DevGateway {
    address: String,
    shutdown: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl DevGateway {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            shutdown: CancellationToken::new(),
            local_addr: Mutex::new(None),
        }
    }

    /// Address the gateway is serving on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

impl std::fmt::Debug for DevGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevGateway")
            .field("address", &self.address)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[async_trait]
impl GatewayService for DevGateway {
    async fn start(&self, pool: Arc<dyn WorkerPool>) -> Result<(), MembraneError> {
        let listener = TcpListener::bind(&self.address).await.map_err(|e| {
            MembraneError::Gateway(format!("could not bind {}: {}", self.address, e))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MembraneError::Gateway(e.to_string()))?;
        *self.local_addr.lock() = Some(local_addr);
        info!(address = %local_addr, "gateway listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, router(pool))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| MembraneError::Gateway(e.to_string()))?;

        debug!("gateway stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<(), MembraneError> {
        self.shutdown.cancel();
        Ok(())
    }
}

/// Router forwarding every request to a worker from `pool`.
pub fn router(pool: Arc<dyn WorkerPool>) -> Router {
    Router::new().fallback(dispatch).with_state(pool)
}

/// Local request, as seen by the canonical conversion.
struct DevRequest(http::Request<Vec<u8>>);

impl DevRequest {
    fn topic(&self) -> Option<&str> {
        let request = &self.0;
        let is_event = request
            .headers()
            .get(TRIGGER_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("event"));
        if request.method() != http::Method::POST || !is_event {
            return None;
        }
        request
            .uri()
            .path()
            .strip_prefix(TOPIC_PREFIX)
            .filter(|topic| !topic.is_empty() && !topic.contains('/'))
    }
}

impl ToCanonical for DevRequest {
    fn to_canonical(self) -> Trigger {
        let Some(topic) = self.topic().map(str::to_string) else {
            return self.0.to_canonical();
        };

        let (parts, payload) = self.0.into_parts();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let mut event = Event::new(topic, payload);
        if let Some(content_type) = header("content-type") {
            event = event.with_content_type(content_type);
        }
        if let Some(request_id) = header("x-request-id") {
            event = event.with_request_id(request_id);
        }
        Trigger::Event(event)
    }
}

async fn dispatch(State(pool): State<Arc<dyn WorkerPool>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };
    let trigger = DevRequest(http::Request::from_parts(parts, body.to_vec())).to_canonical();

    match forward(pool.as_ref(), trigger).await {
        Ok(response) => response.map(Body::from),
        Err(e) => {
            let status = match &e {
                MembraneError::TriggerTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, status = status.as_u16(), "trigger dispatch failed");
            (status, e.to_string()).into_response()
        }
    }
}

async fn forward(
    pool: &dyn WorkerPool,
    trigger: Trigger,
) -> Result<http::Response<Vec<u8>>, MembraneError> {
    let worker = pool.get_worker(None)?;
    let request_id = match &trigger {
        Trigger::Event(event) => event.request_id.clone(),
        Trigger::Http(_) => String::new(),
    };

    let converted = match worker.handle_trigger(trigger).await? {
        TriggerOutcome::Http(response) => {
            http::Response::<Vec<u8>>::from_http_response(response)
        }
        TriggerOutcome::EventAcknowledged => {
            http::Response::<Vec<u8>>::from_event_ack(EventAck {
                request_id,
                success: true,
            })
        }
    };
    converted.map_err(|e| MembraneError::Gateway(format!("invalid function response: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use membrane_core::{HttpRequest, HttpResponse, WorkerId};
    use membrane_pool::ProcessPool;
    use tower::ServiceExt;

    use super::*;

    struct EchoWorker {
        id: WorkerId,
        events: Mutex<Vec<Event>>,
    }

    impl EchoWorker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: WorkerId::next(),
                events: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Worker for EchoWorker {
        fn id(&self) -> WorkerId {
            self.id
        }

        async fn handle_http_request(
            &self,
            request: HttpRequest,
        ) -> Result<HttpResponse, MembraneError> {
            Ok(HttpResponse::new(201)
                .with_header("x-path", request.path)
                .with_header("set-cookie", "a=1")
                .with_header("set-cookie", "b=2")
                .with_body(request.body))
        }

        async fn handle_event(&self, event: Event) -> Result<(), MembraneError> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    struct BusyWorker(WorkerId);

    #[async_trait]
    impl Worker for BusyWorker {
        fn id(&self) -> WorkerId {
            self.0
        }

        async fn handle_http_request(
            &self,
            _request: HttpRequest,
        ) -> Result<HttpResponse, MembraneError> {
            Err(MembraneError::WorkerBusy)
        }
    }

    struct TooLargeWorker(WorkerId);

    #[async_trait]
    impl Worker for TooLargeWorker {
        fn id(&self) -> WorkerId {
            self.0
        }

        async fn handle_http_request(
            &self,
            _request: HttpRequest,
        ) -> Result<HttpResponse, MembraneError> {
            Err(MembraneError::TriggerTooLarge {
                size: MAX_FRAME_LENGTH + 1,
                limit: MAX_FRAME_LENGTH,
            })
        }
    }

    fn pool_with(worker: Arc<dyn Worker>) -> Arc<dyn WorkerPool> {
        let pool = ProcessPool::default();
        pool.add_worker(worker).unwrap();
        Arc::new(pool)
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    // === HTTP triggers ===

    #[tokio::test]
    async fn test_http_request_is_forwarded() {
        let app = router(pool_with(EchoWorker::new()));

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("PUT")
                    .uri("/orders/7?x=1")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-path"], "/orders/7");
        let cookies: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(body_bytes(response).await, b"payload");
    }

    #[tokio::test]
    async fn test_empty_pool_is_unavailable() {
        let app = router(Arc::new(ProcessPool::default()));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_busy_worker_is_unavailable() {
        let app = router(pool_with(Arc::new(BusyWorker(WorkerId::next()))));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unsupported_trigger_is_internal_error() {
        let app = router(pool_with(Arc::new(BusyWorker(WorkerId::next()))));

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/topic/orders")
                    .header(TRIGGER_HEADER, "event")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let worker = EchoWorker::new();
        let app = router(pool_with(worker));

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from(vec![0u8; MAX_BODY_BYTES + 1]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_oversized_trigger_is_payload_too_large() {
        let app = router(pool_with(Arc::new(TooLargeWorker(WorkerId::next()))));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_body_limit_fits_one_frame() {
        assert!(MAX_BODY_BYTES.div_ceil(3) * 4 < MAX_FRAME_LENGTH);
    }

    // === Event triggers ===

    #[tokio::test]
    async fn test_topic_post_is_delivered_as_event() {
        let worker = EchoWorker::new();
        let app = router(pool_with(worker.clone()));

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/topic/orders")
                    .header(TRIGGER_HEADER, "event")
                    .header("content-type", "application/json")
                    .header("x-request-id", "req-1")
                    .body(Body::from(r#"{"id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-1");

        let events = worker.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "orders");
        assert_eq!(events[0].content_type, "application/json");
        assert_eq!(events[0].payload, br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_topic_post_without_marker_is_http() {
        let worker = EchoWorker::new();
        let app = router(pool_with(worker.clone()));

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/topic/orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(worker.events.lock().is_empty());
    }

    // === Lifecycle ===

    #[tokio::test]
    async fn test_stop_ends_start() {
        let gateway = Arc::new(DevGateway::new("127.0.0.1:0"));
        let running = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.start(Arc::new(ProcessPool::default())).await })
        };

        for _ in 0..100 {
            if gateway.local_addr().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gateway.local_addr().is_some());

        gateway.stop().await.unwrap();
        running.await.unwrap().unwrap();
    }
}
