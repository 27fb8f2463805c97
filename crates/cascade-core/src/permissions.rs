//! Permission gating for tool operations.
//!
//! Every tool call passes through [`PermissionManager::check`] before any
//! side effect happens. Decisions are cached per `(level, operation key)`
//! with a TTL so the user is not re-prompted for an operation they already
//! answered. The cache is a plain lock-protected map; population is rare and
//! idempotent, so last-write-wins under concurrent checks is acceptable.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CascadeError, Result};

/// How long a cached decision stays valid.
const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(3600);

/// Risk classification for a tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only, auto-approved.
    Safe,
    /// Changes files; auto-approved only for pre-approved scopes.
    Modify,
    /// System-level side effects; always prompted unless a session approval exists.
    Dangerous,
}

impl RiskLevel {
    /// Machine key for the level.
    pub fn key(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Modify => "modify",
            Self::Dangerous => "dangerous",
        }
    }

    /// Human description template wrapped around an action string.
    pub fn describe(self, action: &str) -> String {
        match self {
            Self::Safe => format!("Read-only operation: {action}"),
            Self::Modify => format!("Modifies local files: {action}"),
            Self::Dangerous => format!("System-level operation: {action}"),
        }
    }
}

/// A cached approval or denial.
#[derive(Debug, Clone)]
pub struct PermissionDecision {
    pub level: RiskLevel,
    pub operation_key: String,
    pub approved: bool,
    pub expires_at: Instant,
}

/// Seam for interactive or policy-driven approval.
///
/// The server installs a policy handler; tests install scripted ones.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn request_approval(
        &self,
        level: RiskLevel,
        operation_key: &str,
        description: &str,
    ) -> bool;
}

/// Denies everything that is not auto-approved. The headless default.
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn request_approval(&self, _level: RiskLevel, _op: &str, _description: &str) -> bool {
        false
    }
}

pub struct PermissionManager {
    handler: Arc<dyn ApprovalHandler>,
    decisions: Mutex<HashMap<(RiskLevel, String), PermissionDecision>>,
    /// Operation keys auto-approved at the Modify level.
    preapproved: Vec<String>,
    decision_ttl: Duration,
    audit_log: Option<PathBuf>,
}

impl PermissionManager {
    pub fn new(handler: Arc<dyn ApprovalHandler>) -> Self {
        Self {
            handler,
            decisions: Mutex::new(HashMap::new()),
            preapproved: Vec::new(),
            decision_ttl: DEFAULT_DECISION_TTL,
            audit_log: dirs::config_dir().map(|d| d.join("cascade").join("audit.log")),
        }
    }

    /// Auto-approve these operation keys at the Modify level.
    pub fn with_preapproved(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.preapproved = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_decision_ttl(mut self, ttl: Duration) -> Self {
        self.decision_ttl = ttl;
        self
    }

    /// Override the audit log location (None disables auditing).
    pub fn with_audit_log(mut self, path: Option<PathBuf>) -> Self {
        self.audit_log = path;
        self
    }

    /// Gate an operation. Runs before any side effect.
    pub async fn check(
        &self,
        level: RiskLevel,
        operation_key: &str,
        description: &str,
    ) -> Result<()> {
        if level == RiskLevel::Safe {
            self.audit(level, operation_key, true, false);
            return Ok(());
        }

        if let Some(decision) = self.cached(level, operation_key) {
            self.audit(level, operation_key, decision.approved, true);
            return if decision.approved {
                Ok(())
            } else {
                Err(self.denied(operation_key, "cached denial"))
            };
        }

        if level == RiskLevel::Modify && self.in_preapproved_scope(operation_key) {
            self.record(level, operation_key, true);
            self.audit(level, operation_key, true, false);
            return Ok(());
        }

        let approved = self
            .handler
            .request_approval(level, operation_key, description)
            .await;
        self.record(level, operation_key, approved);
        self.audit(level, operation_key, approved, false);

        if approved {
            Ok(())
        } else {
            Err(self.denied(operation_key, "rejected by user or policy"))
        }
    }

    /// Record an explicit user decision, e.g. a session-scoped approval.
    pub fn record(&self, level: RiskLevel, operation_key: &str, approved: bool) {
        let decision = PermissionDecision {
            level,
            operation_key: operation_key.to_string(),
            approved,
            expires_at: Instant::now() + self.decision_ttl,
        };
        self.decisions
            .lock()
            .insert((level, operation_key.to_string()), decision);
    }

    pub fn clear_cache(&self) {
        self.decisions.lock().clear();
    }

    fn cached(&self, level: RiskLevel, operation_key: &str) -> Option<PermissionDecision> {
        let mut decisions = self.decisions.lock();
        let key = (level, operation_key.to_string());
        match decisions.get(&key) {
            Some(decision) if decision.expires_at > Instant::now() => Some(decision.clone()),
            Some(_) => {
                decisions.remove(&key);
                None
            }
            None => None,
        }
    }

    fn in_preapproved_scope(&self, operation_key: &str) -> bool {
        self.preapproved.iter().any(|scope| operation_key == scope)
    }

    fn denied(&self, operation_key: &str, reason: &str) -> CascadeError {
        CascadeError::PermissionDenied {
            operation: operation_key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Append one audit line per decision. Logging failures never fail the operation.
    fn audit(&self, level: RiskLevel, operation_key: &str, granted: bool, cached: bool) {
        let Some(ref path) = self.audit_log else {
            return;
        };

        let status = if granted { "GRANTED" } else { "DENIED" };
        let cache_note = if cached { " (cached)" } else { "" };
        let line = format!(
            "[{}] [{}] {operation_key} -> {status}{cache_note}\n",
            chrono::Utc::now().to_rfc3339(),
            level.key(),
        );

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            file.write_all(line.as_bytes())
        };

        if let Err(e) = write() {
            tracing::debug!("Failed to write audit log: {}", e);
        }
    }
}
