use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Components tracked by the gateway.
pub const COMPONENT_GATEWAY: &str = "gateway";
pub const COMPONENT_AI: &str = "gemini";
pub const COMPONENT_OAUTH: &str = "google_oauth";
pub const COMPONENT_RENDERER: &str = "wkhtmltopdf";

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub updated_at: String,
    pub last_ok: Option<String>,
    pub last_error: Option<String>,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub pid: u32,
    pub updated_at: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

pub struct HealthRegistry {
    started_at: Instant,
    components: Mutex<BTreeMap<String, ComponentHealth>>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            components: Mutex::new(BTreeMap::new()),
        }
    }

    fn upsert_component<F>(&self, component: &str, update: F)
    where
        F: FnOnce(&mut ComponentHealth),
    {
        let mut map = self.components.lock();
        let now = now_rfc3339();
        let entry = map
            .entry(component.to_string())
            .or_insert_with(|| ComponentHealth {
                status: "starting".into(),
                updated_at: now.clone(),
                last_ok: None,
                last_error: None,
                error_count: 0,
            });
        update(entry);
        entry.updated_at = now;
    }

    pub fn mark_component_ok(&self, component: &str) {
        self.upsert_component(component, |entry| {
            entry.status = "ok".into();
            entry.last_ok = Some(now_rfc3339());
            entry.last_error = None;
        });
    }

    #[allow(clippy::needless_pass_by_value)]
    pub fn mark_component_error(&self, component: &str, error: impl ToString) {
        let err = error.to_string();
        self.upsert_component(component, move |entry| {
            entry.status = "error".into();
            entry.last_error = Some(err);
            entry.error_count = entry.error_count.saturating_add(1);
        });
    }

    pub fn component(&self, component: &str) -> Option<ComponentHealth> {
        self.components.lock().get(component).cloned()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let components = self.components.lock().clone();
        // Upstream failures degrade the app but every route still answers.
        let status = if components.values().any(|c| c.status == "error") {
            "degraded"
        } else {
            "ok"
        };

        HealthSnapshot {
            status,
            pid: std::process::id(),
            updated_at: now_rfc3339(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            components,
        }
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_else(|_| {
            serde_json::json!({
                "status": "error",
                "message": "failed to serialize health snapshot"
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_component_ok_initializes_component_state() {
        let registry = HealthRegistry::new();
        registry.mark_component_ok("gateway");

        let entry = registry.component("gateway").unwrap();
        assert_eq!(entry.status, "ok");
        assert!(entry.last_ok.is_some());
        assert!(entry.last_error.is_none());
        assert_eq!(registry.snapshot().status, "ok");
    }

    #[test]
    fn mark_component_error_then_ok_clears_last_error() {
        let registry = HealthRegistry::new();
        registry.mark_component_error(COMPONENT_AI, "quota exceeded");
        let errored = registry.component(COMPONENT_AI).unwrap();
        assert_eq!(errored.status, "error");
        assert_eq!(errored.last_error.as_deref(), Some("quota exceeded"));
        assert_eq!(errored.error_count, 1);
        assert_eq!(registry.snapshot().status, "degraded");

        registry.mark_component_ok(COMPONENT_AI);
        let recovered = registry.component(COMPONENT_AI).unwrap();
        assert_eq!(recovered.status, "ok");
        assert!(recovered.last_error.is_none());
        assert_eq!(recovered.error_count, 1);
    }

    #[test]
    fn snapshot_json_contains_registered_component_fields() {
        let registry = HealthRegistry::new();
        registry.mark_component_ok(COMPONENT_RENDERER);

        let json = registry.snapshot_json();
        let component = &json["components"][COMPONENT_RENDERER];
        assert_eq!(component["status"], "ok");
        assert!(component["updated_at"].as_str().is_some());
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_seconds"].as_u64().is_some());
    }
}
