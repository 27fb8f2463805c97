//! Intent-based model routing with availability caching and fallback.
//!
//! Intent classification is deterministic keyword scoring, no extra model
//! call, so routing latency stays near zero. When two intents tie on keyword
//! hits the priority order SEARCH > CODE > CHAT > SHELL > UNKNOWN wins. That
//! order is an assumption carried over from observed behavior, not a settled
//! rule; validate it empirically before relying on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::ModelBackend;
use crate::error::{CascadeError, Result};

/// Availability cache TTL.
const DEFAULT_AVAILABILITY_TTL: Duration = Duration::from_secs(300);

/// Soft latency ceiling; slower-but-successful responses are warnings.
const DEFAULT_LATENCY_THRESHOLD: Duration = Duration::from_secs(5);

/// User intent categories, in tie-break priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Search,
    Code,
    Chat,
    Shell,
    Unknown,
}

impl Intent {
    /// Tie-break priority; higher wins when keyword scores are equal.
    fn priority(self) -> u8 {
        match self {
            Self::Search => 4,
            Self::Code => 3,
            Self::Chat => 2,
            Self::Shell => 1,
            Self::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Code => "code",
            Self::Chat => "chat",
            Self::Shell => "shell",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of routing one query.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingResult {
    pub intent: Intent,
    pub model: String,
    pub confidence: f64,
    pub used_fallback: bool,
}

/// Cached availability of one model.
#[derive(Debug, Clone)]
pub struct ModelAvailability {
    pub model: String,
    pub available: bool,
    pub checked_at: Instant,
}

/// Router configuration: intent keywords, model table, fallback chain.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub intent_models: HashMap<Intent, String>,
    pub fallback_chain: Vec<String>,
    pub keywords: HashMap<Intent, Vec<String>>,
    pub availability_ttl: Duration,
    pub latency_threshold: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let intent_models = HashMap::from([
            (Intent::Search, "mini:3b".to_string()),
            (Intent::Code, "coder:14b".to_string()),
            (Intent::Chat, "conversational:20b".to_string()),
            (Intent::Shell, "general:7b".to_string()),
            (Intent::Unknown, "general:7b".to_string()),
        ]);

        let fallback_chain = vec![
            "coder:14b".to_string(),
            "general:7b".to_string(),
            "mini:3b".to_string(),
        ];

        let keywords = HashMap::from([
            (
                Intent::Search,
                ["find", "search", "locate", "where", "look for"]
                    .map(String::from)
                    .to_vec(),
            ),
            (
                Intent::Code,
                ["code", "debug", "fix", "refactor", "implement", "function", "class"]
                    .map(String::from)
                    .to_vec(),
            ),
            (
                Intent::Chat,
                ["chat", "talk", "explain", "creative", "write", "help me understand"]
                    .map(String::from)
                    .to_vec(),
            ),
            (
                Intent::Shell,
                ["shell", "command", "docker", "system", "run", "execute", "terminal"]
                    .map(String::from)
                    .to_vec(),
            ),
        ]);

        Self {
            intent_models,
            fallback_chain,
            keywords,
            availability_ttl: DEFAULT_AVAILABILITY_TTL,
            latency_threshold: DEFAULT_LATENCY_THRESHOLD,
        }
    }
}

/// Routes queries to models based on detected intent.
pub struct ModelRouter {
    config: RouterConfig,
    backend: Arc<dyn ModelBackend>,
    availability: Mutex<HashMap<String, ModelAvailability>>,
}

impl ModelRouter {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self::with_config(backend, RouterConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ModelBackend>, config: RouterConfig) -> Self {
        Self {
            config,
            backend,
            availability: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Detect intent via keyword hit counts. Returns `(intent, confidence)`.
    pub fn detect_intent(&self, query: &str) -> (Intent, f64) {
        let query_lower = query.to_lowercase();

        let mut best = Intent::Unknown;
        let mut best_score = 0usize;

        for (&intent, keywords) in &self.config.keywords {
            let score = keywords
                .iter()
                .filter(|kw| query_lower.contains(kw.as_str()))
                .count();

            if score > best_score
                || (score == best_score && score > 0 && intent.priority() > best.priority())
            {
                best = intent;
                best_score = score;
            }
        }

        let confidence = (best_score as f64 / 3.0).min(1.0);
        (best, confidence)
    }

    /// Route a query: detect intent, pick the intent's model, check
    /// availability, fall back along the chain if needed.
    pub async fn route(&self, query: &str) -> Result<RoutingResult> {
        self.route_with_override(query, None).await
    }

    /// Like [`route`](Self::route), but an explicit model override skips the
    /// intent → model table while still walking availability + fallback.
    pub async fn route_with_override(
        &self,
        query: &str,
        model_override: Option<&str>,
    ) -> Result<RoutingResult> {
        let (intent, confidence) = self.detect_intent(query);

        let primary = match model_override {
            Some(model) => model.to_string(),
            None => self
                .config
                .intent_models
                .get(&intent)
                .cloned()
                .unwrap_or_else(|| self.config.fallback_chain[0].clone()),
        };

        if self.check_availability(&primary).await {
            return Ok(RoutingResult {
                intent,
                model: primary,
                confidence,
                used_fallback: false,
            });
        }

        tracing::info!(model = %primary, "Primary model unavailable, walking fallback chain");

        match self.get_fallback(&primary).await {
            Some(fallback) => Ok(RoutingResult {
                intent,
                model: fallback,
                confidence,
                used_fallback: true,
            }),
            None => Err(CascadeError::ModelUnavailable(format!(
                "{primary} and all fallbacks are unavailable"
            ))),
        }
    }

    /// Check model availability with a TTL cache.
    ///
    /// Concurrent misses may both query the backend and both populate the
    /// cache; the writes are idempotent, last write wins.
    pub async fn check_availability(&self, model: &str) -> bool {
        {
            let cache = self.availability.lock();
            if let Some(entry) = cache.get(model) {
                if entry.checked_at.elapsed() < self.config.availability_ttl {
                    return entry.available;
                }
            }
        }

        let available = match self.backend.list_available().await {
            Ok(models) => models.iter().any(|m| m == model),
            Err(e) => {
                tracing::warn!(model, error = %e, "Availability check failed");
                false
            }
        };

        self.availability.lock().insert(
            model.to_string(),
            ModelAvailability {
                model: model.to_string(),
                available,
                checked_at: Instant::now(),
            },
        );

        available
    }

    /// Walk the fallback chain, skipping the failed model, returning the
    /// first available one.
    pub async fn get_fallback(&self, failed_model: &str) -> Option<String> {
        for model in &self.config.fallback_chain {
            if model != failed_model && self.check_availability(model).await {
                return Some(model.clone());
            }
        }
        None
    }

    /// Classify a measured latency against the configured soft ceiling.
    pub fn is_slow(&self, latency: Duration) -> bool {
        latency > self.config.latency_threshold
    }

    pub fn clear_cache(&self) {
        self.availability.lock().clear();
    }
}
