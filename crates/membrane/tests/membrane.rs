//! End-to-end tests for the membrane composition root.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use membrane::plugins::{
    DocumentService, EventService, GatewayService, QueueService, StorageService,
};
use membrane::protocol::{FunctionClient, FunctionHandler};
use membrane::{
    ConfigurationError, Event, HttpRequest, HttpResponse, Membrane, MembraneError,
    MembraneOptions, ProcessPool, Worker, WorkerId, WorkerPool,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

// === Mocks ===

#[derive(Default)]
struct MockGateway {
    started: AtomicBool,
    block: bool,
    fail_stop: bool,
    pool: Mutex<Option<Arc<dyn WorkerPool>>>,
    ready: Notify,
    stopped: Notify,
}

impl MockGateway {
    fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl GatewayService for MockGateway {
    async fn start(&self, pool: Arc<dyn WorkerPool>) -> Result<(), MembraneError> {
        *self.pool.lock() = Some(pool);
        self.started.store(true, Ordering::SeqCst);
        self.ready.notify_one();
        if self.block {
            self.stopped.notified().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), MembraneError> {
        self.stopped.notify_one();
        if self.fail_stop {
            return Err(MembraneError::Gateway("stop failed".to_string()));
        }
        Ok(())
    }
}

struct MockDocuments;
impl DocumentService for MockDocuments {}

struct MockEvents;
impl EventService for MockEvents {}

struct MockQueue;
impl QueueService for MockQueue {}

struct MockStorage;
impl StorageService for MockStorage {}

struct Echo;

#[async_trait]
impl FunctionHandler for Echo {
    async fn on_http_request(&self, request: HttpRequest) -> HttpResponse {
        let mut response = HttpResponse::new(200).with_body(request.body);
        response.headers = request.headers;
        response
    }

    async fn on_event(&self, _event: Event) -> bool {
        true
    }
}

fn with_all_services(options: MembraneOptions) -> MembraneOptions {
    MembraneOptions {
        documents: Some(Arc::new(MockDocuments)),
        events: Some(Arc::new(MockEvents)),
        queue: Some(Arc::new(MockQueue)),
        storage: Some(Arc::new(MockStorage)),
        ..options
    }
}

fn free_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// === Creation ===

#[test]
fn test_new_without_gateway_fails() {
    let err = Membrane::new(with_all_services(MembraneOptions::default())).unwrap_err();
    assert!(matches!(
        err,
        MembraneError::Configuration(ConfigurationError::MissingGatewayPlugin)
    ));

    let tolerant = MembraneOptions::default().tolerate_missing_services(true);
    assert!(Membrane::new(tolerant).is_err());
}

#[test]
fn test_new_gateway_only_without_tolerance_fails() {
    let options = MembraneOptions::default().with_gateway(Arc::new(MockGateway::default()));

    let err = Membrane::new(options).unwrap_err();
    let missing = match err {
        MembraneError::Configuration(ConfigurationError::MissingServices(missing)) => missing,
        other => panic!("expected missing services, got {other:?}"),
    };
    assert_eq!(missing, vec!["documents", "events", "queue", "storage"]);
}

#[test]
fn test_new_gateway_only_with_tolerance_succeeds() {
    let options = MembraneOptions::default()
        .with_gateway(Arc::new(MockGateway::default()))
        .tolerate_missing_services(true)
        .suppress_logs(true);

    assert!(Membrane::new(options).is_ok());
}

#[test]
fn test_new_with_all_services_succeeds() {
    let gateway = Arc::new(MockGateway::default());
    let options = with_all_services(MembraneOptions::default().with_gateway(gateway));

    let membrane = Membrane::new(options).unwrap();
    assert!(membrane.documents().is_some());
    assert!(membrane.storage().is_some());
}

// === Start ===

#[tokio::test]
async fn test_tolerant_start_runs_gateway_without_function() {
    let gateway = Arc::new(MockGateway::default());
    let membrane = Membrane::new(
        MembraneOptions::default()
            .with_gateway(gateway.clone())
            .with_service_address("127.0.0.1:0")
            .with_child_timeout(Duration::from_millis(100))
            .tolerate_missing_services(true)
            .suppress_logs(true),
    )
    .unwrap();

    membrane.start().await.unwrap();
    assert!(gateway.started.load(Ordering::SeqCst));

    membrane.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_without_tolerance_times_out() {
    let gateway = Arc::new(MockGateway::default());
    let membrane = Membrane::new(with_all_services(
        MembraneOptions::default()
            .with_gateway(gateway.clone())
            .with_service_address("127.0.0.1:0")
            .with_child_timeout(Duration::from_millis(100))
            .suppress_logs(true),
    ))
    .unwrap();

    let err = membrane.start().await.unwrap_err();
    assert!(matches!(err, MembraneError::ChildStartupTimeout(_)));
    assert!(!gateway.started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_start_on_bound_address_fails_to_listen() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = taken.local_addr().unwrap().to_string();
    let membrane = Membrane::new(
        MembraneOptions::default()
            .with_gateway(Arc::new(MockGateway::default()))
            .with_service_address(address)
            .tolerate_missing_services(true)
            .suppress_logs(true),
    )
    .unwrap();

    let err = membrane.start().await.unwrap_err();
    assert!(matches!(err, MembraneError::Listen { .. }));
    assert!(err.to_string().contains("Could not listen"));
}

#[tokio::test]
async fn test_start_with_missing_command_fails() {
    for tolerate in [false, true] {
        let gateway = Arc::new(MockGateway::default());
        let membrane = Membrane::new(with_all_services(
            MembraneOptions::default()
                .with_gateway(gateway.clone())
                .with_service_address("127.0.0.1:0")
                .with_child_command(["definitely-not-a-real-command-xyz"])
                .with_child_timeout(Duration::from_secs(1))
                .tolerate_missing_services(tolerate)
                .suppress_logs(true),
        ))
        .unwrap();

        let err = membrane.start().await.unwrap_err();
        assert!(matches!(
            err,
            MembraneError::ChildProcess(_) | MembraneError::ChildStartupTimeout(_)
        ));
        assert!(!gateway.started.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn test_start_with_registered_worker_is_ready() {
    let pool = Arc::new(ProcessPool::default());
    pool.add_worker(Arc::new(StubWorker(WorkerId::next()))).unwrap();

    let gateway = Arc::new(MockGateway::default());
    let membrane = Membrane::new(
        MembraneOptions::default()
            .with_gateway(gateway.clone())
            .with_pool(pool)
            .with_service_address("127.0.0.1:0")
            .tolerate_missing_services(true)
            .suppress_logs(true),
    )
    .unwrap();

    membrane.start().await.unwrap();
    assert!(membrane.child_state().unwrap().is_ready());
    assert!(gateway.started.load(Ordering::SeqCst));
    membrane.stop().await.unwrap();
}

struct StubWorker(WorkerId);

#[async_trait]
impl Worker for StubWorker {
    fn id(&self) -> WorkerId {
        self.0
    }
}

// === Full stack ===

async fn start_with_function(
    gateway: Arc<MockGateway>,
) -> (Arc<Membrane>, tokio::task::JoinHandle<Result<(), MembraneError>>, String) {
    let address = free_address();
    let membrane = Arc::new(
        Membrane::new(
            MembraneOptions::default()
                .with_gateway(gateway.clone())
                .with_service_address(address.clone())
                .with_child_timeout(Duration::from_secs(5))
                .tolerate_missing_services(true)
                .suppress_logs(true),
        )
        .unwrap(),
    );

    let running = {
        let membrane = membrane.clone();
        tokio::spawn(async move { membrane.start().await })
    };
    (membrane, running, address)
}

async fn connect(address: &str) -> FunctionClient {
    for _ in 0..100 {
        if let Ok(client) = FunctionClient::connect(address, Some("rust".to_string())).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("membrane never accepted a function stream");
}

#[tokio::test]
async fn test_trigger_round_trip_through_membrane() {
    let gateway = Arc::new(MockGateway::blocking());
    let (membrane, running, address) = start_with_function(gateway.clone()).await;

    let client = connect(&address).await;
    let function = tokio::spawn(async move { client.serve(&Echo).await });

    gateway.ready.notified().await;
    let pool = gateway.pool.lock().clone().unwrap();
    let worker = pool.get_worker(None).unwrap();

    let request = HttpRequest::new("POST", "/echo")
        .with_header("x-multi", "one")
        .with_header("x-multi", "two")
        .with_body(vec![0u8, 159, 146, 150, b'\n']);
    let response = worker.handle_http_request(request.clone()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, request.body);
    assert_eq!(response.headers, request.headers);

    worker.handle_event(Event::new("orders", "{}")).await.unwrap();
    drop(worker);

    membrane.stop().await.unwrap();
    running.await.unwrap().unwrap();
    function.await.unwrap().unwrap();
    assert_eq!(pool.worker_count(), 0);
}

#[tokio::test]
async fn test_disconnected_function_is_unregistered() {
    let gateway = Arc::new(MockGateway::blocking());
    let (membrane, running, address) = start_with_function(gateway.clone()).await;

    let mut client = connect(&address).await;
    gateway.ready.notified().await;
    let pool = gateway.pool.lock().clone().unwrap();
    let worker = pool.get_worker(None).unwrap();

    let pending = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.handle_http_request(HttpRequest::new("GET", "/")).await })
    };
    client.next_message().await.unwrap().unwrap();
    drop(client);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, MembraneError::Stream(_)));
    assert!(eventually(|| pool.worker_count() == 0).await);
    assert!(matches!(
        pool.get_worker(None),
        Err(MembraneError::NoWorkersAvailable)
    ));

    membrane.stop().await.unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stop_reports_first_error_and_finishes_teardown() {
    let gateway = Arc::new(MockGateway {
        block: true,
        fail_stop: true,
        ..MockGateway::default()
    });
    let (membrane, running, address) = start_with_function(gateway.clone()).await;

    let _client = connect(&address).await;
    gateway.ready.notified().await;

    let err = membrane.stop().await.unwrap_err();
    assert!(matches!(err, MembraneError::Gateway(_)));
    running.await.unwrap().unwrap();

    assert!(eventually(|| membrane.pool().worker_count() == 0).await);
    assert!(tokio::net::TcpStream::connect(&address).await.is_err());
}
