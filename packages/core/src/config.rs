//! Bridge configuration, populated from environment variables.

/// Runtime configuration for the bridge.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `PSICASH_USER_AGENT` | `Psiphon-PsiCash-Android` | User-agent handed to the engine at init |
/// | `PSICASH_LOG` | `psicash_bridge=info,psicash_jni=info` | `tracing` filter for the host binding |
///
/// Empty values count as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// User-agent string the engine sends with its requests.
    pub user_agent: String,

    /// `tracing` `EnvFilter` directive.
    pub log_filter: String,
}

pub const DEFAULT_USER_AGENT: &str = "Psiphon-PsiCash-Android";
pub const DEFAULT_LOG_FILTER: &str = "psicash_bridge=info,psicash_jni=info";

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.into(),
            log_filter: DEFAULT_LOG_FILTER.into(),
        }
    }
}

impl BridgeConfig {
    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            user_agent: var("PSICASH_USER_AGENT", DEFAULT_USER_AGENT),
            log_filter: var("PSICASH_LOG", DEFAULT_LOG_FILTER),
        }
    }
}
