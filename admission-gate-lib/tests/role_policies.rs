use admission_gate_lib::admission::{
    AdmissionManager, CallerIdentity, Decision, PartitionKey, Policy, PolicyRegistry, Principal,
    QueueOrder, Role, RolePolicy,
};
use admission_gate_lib::config::{load_from_str, AdmissionSettings};
use admission_gate_lib::AdmissionError;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
}

fn caller(last: u8, roles: &[Role]) -> CallerIdentity {
    CallerIdentity::authenticated(Some(ip(last)), Principal::new("user", roles.iter().copied()))
}

fn manager() -> Result<AdmissionManager, AdmissionError> {
    let mut registry = PolicyRegistry::new();
    registry.register(Policy::new("readCommon", 5, MINUTE))?;
    registry.register_role_based(
        RolePolicy::new("writeByRole")
            .with_role(Role::Admin, Policy::new("writeByRole", 20, MINUTE))
            .with_role(Role::Recepcionista, Policy::new("writeByRole", 5, MINUTE)),
    )?;
    Ok(AdmissionManager::new(registry, &AdmissionSettings::default()))
}

fn count_allowed(
    manager: &AdmissionManager,
    policy: &str,
    identity: &CallerIdentity,
    calls: usize,
    now: Instant,
) -> Result<usize, AdmissionError> {
    let mut allowed = 0;
    for _ in 0..calls {
        if manager.evaluate(policy, identity, now)?.is_allowed() {
            allowed += 1;
        }
    }
    Ok(allowed)
}

#[test]
fn test_admin_and_recepcionista_quotas() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let now = Instant::now();

    let admin = caller(1, &[Role::Admin]);
    assert_eq!(count_allowed(&manager, "writeByRole", &admin, 25, now)?, 20);

    let recepcionista = caller(2, &[Role::Recepcionista]);
    assert_eq!(count_allowed(&manager, "writeByRole", &recepcionista, 6, now)?, 5);
    Ok(())
}

#[test]
fn test_role_partition_is_shared_across_addresses(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let now = Instant::now();

    assert_eq!(count_allowed(&manager, "writeByRole", &caller(1, &[Role::Recepcionista]), 3, now)?, 3);
    // Same role from another address draws from the same quota.
    assert_eq!(count_allowed(&manager, "writeByRole", &caller(9, &[Role::Recepcionista]), 3, now)?, 2);
    Ok(())
}

#[test]
fn test_best_role_wins() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let both = caller(1, &[Role::Recepcionista, Role::Admin]);
    assert_eq!(count_allowed(&manager, "writeByRole", &both, 21, Instant::now())?, 20);
    Ok(())
}

#[test]
fn test_unrecognized_role_is_refused() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let guest = CallerIdentity::authenticated(
        Some(ip(3)),
        Principal::from_claims("guest", ["Guest"].into_iter()),
    );
    let anonymous = CallerIdentity::anonymous(ip(4));

    for identity in [&guest, &anonymous] {
        match manager.evaluate("writeByRole", identity, Instant::now()) {
            Err(AdmissionError::UnauthorizedRole { policy }) => assert_eq!(policy, "writeByRole"),
            other => panic!("expected UnauthorizedRole, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn test_role_policy_missing_role_is_refused() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
{
    let mut registry = PolicyRegistry::new();
    registry.register_role_based(
        RolePolicy::new("adminOnly").with_role(Role::Admin, Policy::new("adminOnly", 1, MINUTE)),
    )?;
    let manager = AdmissionManager::new(registry, &AdmissionSettings::default());

    let result = manager.evaluate("adminOnly", &caller(1, &[Role::Recepcionista]), Instant::now());
    assert!(matches!(result, Err(AdmissionError::UnauthorizedRole { .. })));
    Ok(())
}

#[test]
fn test_unknown_policy() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let result = manager.evaluate("missing", &CallerIdentity::anonymous(ip(1)), Instant::now());
    assert!(matches!(result, Err(AdmissionError::UnknownPolicy(name)) if name == "missing"));
    Ok(())
}

#[test]
fn test_fixed_policy_partitions_by_ip() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manager = manager()?;
    let now = Instant::now();
    assert_eq!(count_allowed(&manager, "readCommon", &CallerIdentity::anonymous(ip(1)), 7, now)?, 5);
    assert_eq!(count_allowed(&manager, "readCommon", &CallerIdentity::anonymous(ip(2)), 7, now)?, 5);

    let key = PartitionKey::from_ip(ip(1));
    assert!(manager.try_acquire("readCommon", &key, now)?.is_rejected());
    Ok(())
}

#[test]
fn test_registry_from_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = load_from_str(
        r#"
listen = "127.0.0.1:0"

[[policies]]
name = "reportes"
permit_limit = 2
queue_limit = 1
queue_order = "newest_first"

[[role_policies]]
name = "writeByRole"
roles = [
  { role = "Admin", permit_limit = 20 },
  { role = "Recepcionista", permit_limit = 5 },
]
"#,
    )?;
    let registry = PolicyRegistry::from_config(&cfg.policies, &cfg.role_policies)?;
    assert_eq!(registry.policy_names(), vec!["reportes", "writeByRole"]);
    assert!(registry.is_role_based("writeByRole"));

    let reportes = registry.resolve("reportes")?;
    assert_eq!(reportes.queue_limit(), 1);
    assert_eq!(reportes.queue_order(), QueueOrder::NewestFirst);
    assert_eq!(reportes.window(), MINUTE);

    let admin = registry.resolve_for("writeByRole", &caller(1, &[Role::Admin]))?;
    assert_eq!(admin.name(), "writeByRole.Admin");
    assert_eq!(admin.permit_limit(), 20);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_releases_queued_callers() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
{
    let mut registry = PolicyRegistry::new();
    registry.register(
        Policy::new("reportes", 1, Duration::from_secs(2)).with_queue(2, QueueOrder::OldestFirst),
    )?;
    let manager = Arc::new(AdmissionManager::new(registry, &AdmissionSettings::default()));
    manager.start_sweeper(Duration::from_millis(100));

    let identity = CallerIdentity::anonymous(ip(1));
    let t0 = Instant::now();
    assert!(manager.evaluate("reportes", &identity, t0)?.is_allowed());
    let ticket = match manager.evaluate("reportes", &identity, t0)? {
        Decision::Queued(ticket) => ticket,
        other => panic!("expected queued, got {other:?}"),
    };

    assert!(ticket.wait().await.is_allowed());
    assert!(Instant::now() < t0 + Duration::from_secs(3));

    let rejected = manager.shutdown().await;
    assert_eq!(rejected, 0);
    assert!(manager.controller().is_closed());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_waiting_callers() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
{
    let mut registry = PolicyRegistry::new();
    registry.register(
        Policy::new("reportes", 1, MINUTE).with_queue(2, QueueOrder::OldestFirst),
    )?;
    let manager = Arc::new(AdmissionManager::new(registry, &AdmissionSettings::default()));
    let identity = CallerIdentity::anonymous(ip(1));
    let now = Instant::now();

    assert!(manager.evaluate("reportes", &identity, now)?.is_allowed());
    let waiting = manager.evaluate("reportes", &identity, now)?;
    assert!(waiting.is_queued());

    let waiter = tokio::spawn(async move {
        match waiting {
            Decision::Queued(ticket) => ticket.wait().await.is_rejected(),
            _ => false,
        }
    });
    tokio::task::yield_now().await;

    assert_eq!(manager.shutdown().await, 1);
    assert!(waiter.await?);
    assert!(manager.evaluate("reportes", &identity, now)?.is_rejected());
    Ok(())
}
