//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real orchestrator instances in
//! tests, with the provider gateway, account locks, and notification
//! fanout replaced by observable in-memory doubles.

use room_orchestrator::config::Config;
use room_orchestrator::redis::lock::mock::MockLockManager;
use room_orchestrator::routes::{self, AppState};
use room_orchestrator::services::{MockProviderClient, RecordingNotifier};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the room orchestrator in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health_flow_e2e(pool: PgPool) -> Result<()> {
///     let server = TestRoomServer::spawn(pool).await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .get(&format!("{}/v1/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    locks: Arc<MockLockManager>,
    provider: Arc<MockProviderClient>,
    notifier: Arc<RecordingNotifier>,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a new test server instance with isolated database.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use in-memory doubles for locks, provider, and notifications
    /// - Start the HTTP server in the background
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    ///
    /// # Returns
    /// * `Ok(TestRoomServer)` - Running server instance
    /// * `Err(anyhow::Error)` - If server spawn fails
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_provider(pool, Arc::new(MockProviderClient::new())).await
    }

    /// Spawn a test server with a pre-configured provider double, e.g.
    /// `MockProviderClient::failing_create()` for outage scenarios.
    pub async fn spawn_with_provider(
        pool: PgPool,
        provider: Arc<MockProviderClient>,
    ) -> Result<Self, anyhow::Error> {
        // Build configuration for test environment
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "PROVIDER_BASE_URL".to_string(),
                "https://provider.test/v2".to_string(),
            ),
            ("ORCHESTRATOR_ID".to_string(), "orch-test-001".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        // Observable doubles for the external seams
        let locks = Arc::new(MockLockManager::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            locks: locks.clone(),
            provider: provider.clone(),
            notifier: notifier.clone(),
            // A Prometheus recorder can only be installed once per process;
            // tests run without one.
            metrics_handle: None,
        });

        // Build routes using the orchestrator's real route builder
        let app = routes::build_routes(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            locks,
            provider,
            notifier,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The in-memory account lock manager.
    pub fn locks(&self) -> &MockLockManager {
        &self.locks
    }

    /// The scripted provider double.
    pub fn provider(&self) -> &MockProviderClient {
        &self.provider
    }

    /// The recording notification sink.
    pub fn notifier(&self) -> &RecordingNotifier {
        &self.notifier
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        // Explicitly abort the HTTP server task to ensure immediate cleanup
        // when the test completes.
        self._handle.abort();
    }
}
