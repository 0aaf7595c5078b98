//! Liveness of the service's background loops and health of its dependencies.
//!
//! Kafka clients own a `LivenessHandle` each and report through it whenever their
//! main loop makes progress. A component that has not reported before its deadline is
//! considered stalled. Dependencies, like the document store, are checked on demand.
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use placeholder_common::docstore::HttpDocStoreClient;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Registered but never reported
    Starting,
    HealthyUntil(OffsetDateTime),
    Unhealthy,
    /// Set on read when the HealthyUntil deadline has passed
    Stalled,
}

impl ComponentStatus {
    fn is_healthy(&self) -> bool {
        matches!(self, ComponentStatus::HealthyUntil(_))
    }
}

type Components = Arc<RwLock<BTreeMap<String, ComponentStatus>>>;

#[derive(Clone, Default)]
pub struct LivenessRegistry {
    components: Components,
}

pub struct LivenessHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl LivenessHandle {
    /// Must be called more frequently than the deadline given at registration.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc() + self.deadline,
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut components) => {
                components.insert(self.component.clone(), status);
            }
            Err(_) => warn!(component = %self.component, "poisoned liveness registry lock"),
        }
    }
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, component: &str, deadline: Duration) -> LivenessHandle {
        let handle = LivenessHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Current status of every registered component, stalled ones included.
    pub fn components(&self) -> BTreeMap<String, ComponentStatus> {
        let now = OffsetDateTime::now_utc();
        let Ok(components) = self.components.read() else {
            return BTreeMap::new();
        };

        components
            .iter()
            .map(|(name, status)| {
                let status = match status {
                    ComponentStatus::HealthyUntil(until) if *until <= now => {
                        ComponentStatus::Stalled
                    }
                    other => *other,
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Healthy when at least one component registered and all of them reported in time.
    pub fn is_healthy(&self) -> bool {
        let components = self.components();
        !components.is_empty() && components.values().all(ComponentStatus::is_healthy)
    }
}

/// A dependency whose availability is reported on the health endpoints.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok` carries a short success message, `Err` what went wrong.
    async fn check(&self) -> Result<String, String>;
}

pub struct DocStoreCheck {
    client: HttpDocStoreClient,
}

impl DocStoreCheck {
    pub fn new(client: HttpDocStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyCheck for DocStoreCheck {
    fn name(&self) -> &str {
        "DocumentStoreApiReachable"
    }

    async fn check(&self) -> Result<String, String> {
        self.client
            .connectivity_check()
            .await
            .map(|_| "Document store is good to go".to_owned())
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub name: String,
    pub ok: bool,
    pub checks: Vec<CheckResult>,
}

/// Run every dependency check, then add one result per liveness component.
pub async fn health_report(
    name: &str,
    checks: &[Arc<dyn DependencyCheck>],
    liveness: &LivenessRegistry,
) -> HealthReport {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let (ok, output) = match check.check().await {
            Ok(output) => (true, output),
            Err(output) => (false, output),
        };
        results.push(CheckResult {
            name: check.name().to_owned(),
            ok,
            output,
        });
    }

    let components = liveness.components();
    if components.is_empty() {
        results.push(CheckResult {
            name: "liveness".to_owned(),
            ok: false,
            output: "no component registered".to_owned(),
        });
    }
    for (component, status) in components {
        results.push(CheckResult {
            name: component,
            ok: status.is_healthy(),
            output: format!("{:?}", status),
        });
    }

    let ok = results.iter().all(|result| result.ok);
    if !ok {
        warn!(
            failed = ?results.iter().filter(|r| !r.ok).map(|r| &r.name).collect::<Vec<_>>(),
            "health check failed"
        );
    }

    HealthReport {
        name: name.to_owned(),
        ok,
        checks: results,
    }
}
