use admission_gate_lib::admission::{AdmissionManager, PolicyRegistry};
use admission_gate_lib::config::load_from_str;
use admission_gate_lib::gate::{serve, GateState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const CONFIG: &str = r#"
listen = "127.0.0.1:0"

[[policies]]
name = "readCommon"
permit_limit = 2
window_seconds = 60

[[role_policies]]
name = "writeByRole"
roles = [
  { role = "Admin", permit_limit = 3 },
  { role = "Recepcionista", permit_limit = 1 },
]

[[routes]]
prefix = "/api/ordenes"
methods = ["POST"]
policy = "writeByRole"

[[routes]]
prefix = "/api"
policy = "readCommon"

[timeout]
shutdown_secs = 1
"#;

struct Gate {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<admission_gate_lib::Result<()>>,
}

impl Gate {
    async fn start() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config = Arc::new(load_from_str(CONFIG)?);
        let registry = PolicyRegistry::from_config(&config.policies, &config.role_policies)?;
        let manager = Arc::new(AdmissionManager::new(registry, &config.admission));
        let state = Arc::new(GateState::new(config, manager));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, state, shutdown.clone()));
        Ok(Self { addr, shutdown, handle })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) -> TestResult {
        self.shutdown.cancel();
        self.handle.await??;
        Ok(())
    }
}

fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().no_proxy().build()
}

#[tokio::test]
async fn test_read_quota_then_429() -> TestResult {
    let gate = Gate::start().await?;
    let client = client()?;

    for _ in 0..2 {
        let resp = client.get(gate.url("/api/clientes")).send().await?;
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get("x-admission-policy").and_then(|v| v.to_str().ok()),
            Some("readCommon")
        );
    }

    let resp = client.get(gate.url("/api/clientes")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or("missing Retry-After")?;
    assert!((1..=60).contains(&retry_after));

    drop(client);
    gate.stop().await
}

#[tokio::test]
async fn test_forwarded_for_gets_its_own_partition() -> TestResult {
    let gate = Gate::start().await?;
    let client = client()?;

    for _ in 0..2 {
        let resp = client
            .get(gate.url("/api/clientes"))
            .header("x-forwarded-for", "198.51.100.1")
            .send()
            .await?;
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    }
    let resp = client
        .get(gate.url("/api/clientes"))
        .header("x-forwarded-for", "198.51.100.2")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    drop(client);
    gate.stop().await
}

#[tokio::test]
async fn test_role_quota_and_forbidden() -> TestResult {
    let gate = Gate::start().await?;
    let client = client()?;

    let post = |roles: Option<&'static str>| {
        let mut req = client.post(gate.url("/api/ordenes")).header("x-auth-subject", "ana");
        if let Some(roles) = roles {
            req = req.header("x-auth-roles", roles);
        }
        req.send()
    };

    assert_eq!(post(Some("Recepcionista")).await?.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        post(Some("Recepcionista")).await?.status(),
        reqwest::StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(post(Some("admin")).await?.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(post(Some("Mecanico")).await?.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(post(None).await?.status(), reqwest::StatusCode::FORBIDDEN);

    drop(client);
    gate.stop().await
}

#[tokio::test]
async fn test_original_request_headers_select_route() -> TestResult {
    let gate = Gate::start().await?;
    let client = client()?;

    // auth_request style: the gate sees GET /auth, the real call is a POST.
    let resp = client
        .get(gate.url("/auth"))
        .header("x-original-method", "POST")
        .header("x-original-uri", "/api/ordenes/42?draft=true")
        .header("x-auth-roles", "Admin")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("x-admission-policy").and_then(|v| v.to_str().ok()),
        Some("writeByRole")
    );

    // No route matches and there is no default policy.
    let resp = client.get(gate.url("/static/logo.png")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(resp.headers().get("x-admission-policy").is_none());

    drop(client);
    gate.stop().await
}
