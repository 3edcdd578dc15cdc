/// Configuration management for the console
///
/// Loads configuration from environment variables (and a `.env` file when
/// present) into a type-safe struct.
///
/// # Environment Variables
///
/// - `SPARKCRM_URL`: Backend project URL (required unless demo mode)
/// - `SPARKCRM_ANON_KEY`: Public API key (required unless demo mode)
/// - `SPARKCRM_EMAIL`: Account email used to sign in
/// - `SPARKCRM_PASSWORD`: Account password used to sign in
/// - `SPARKCRM_SESSION_TIMEOUT_MS`: Session check timeout (default: 5000)
/// - `SPARKCRM_FEEDBACK_DISMISS_MS`: Feedback display interval (default: 4000)
/// - `SPARKCRM_DEMO`: `true` to run against a seeded in-memory backend
/// - `RUST_LOG`: Log filter (default: `sparkcrm_console=info,sparkcrm_sync=info`)
///
/// # Example
///
/// ```no_run
/// use sparkcrm_console::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Demo mode: {}", config.is_demo());
/// # Ok(())
/// # }
/// ```

use sparkcrm_shared::remote::RestConfig;
use sparkcrm_sync::config::SyncConfig;
use std::env;
use std::fmt;

/// Email of the account seeded in demo mode
pub const DEMO_EMAIL: &str = "demo@sparkcrm.local";

/// Password of the account seeded in demo mode
pub const DEMO_PASSWORD: &str = "demo-password";

/// Complete console configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which backend to talk to
    pub backend: BackendConfig,

    /// Credentials used when no session exists yet
    pub credentials: Option<LoginConfig>,

    /// Core timeouts and capacities
    pub sync: SyncConfig,
}

/// Backend selection
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Hosted service over HTTPS
    Rest(RestConfig),

    /// Seeded in-memory backend
    Demo,
}

/// Sign-in credentials
#[derive(Clone)]
pub struct LoginConfig {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The backend URL or key is missing outside demo mode
    /// - A numeric variable does not parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let demo = lookup("SPARKCRM_DEMO")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let backend = if demo {
            BackendConfig::Demo
        } else {
            let url = lookup("SPARKCRM_URL")
                .ok_or_else(|| anyhow::anyhow!("SPARKCRM_URL environment variable is required"))?;
            let anon_key = lookup("SPARKCRM_ANON_KEY").ok_or_else(|| {
                anyhow::anyhow!("SPARKCRM_ANON_KEY environment variable is required")
            })?;

            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("SPARKCRM_URL must start with http:// or https://");
            }

            BackendConfig::Rest(RestConfig::new(url, anon_key))
        };

        let credentials = match (lookup("SPARKCRM_EMAIL"), lookup("SPARKCRM_PASSWORD")) {
            (Some(email), Some(password)) => Some(LoginConfig { email, password }),
            _ if demo => Some(LoginConfig {
                email: DEMO_EMAIL.to_string(),
                password: DEMO_PASSWORD.to_string(),
            }),
            _ => None,
        };

        let session_timeout_ms = parse_millis(&lookup, "SPARKCRM_SESSION_TIMEOUT_MS")?;
        let feedback_dismiss_ms = parse_millis(&lookup, "SPARKCRM_FEEDBACK_DISMISS_MS")?;

        Ok(Self {
            backend,
            credentials,
            sync: SyncConfig::from_millis(session_timeout_ms, feedback_dismiss_ms),
        })
    }

    pub fn is_demo(&self) -> bool {
        matches!(self.backend, BackendConfig::Demo)
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> anyhow::Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a whole number of milliseconds: {}", key, e)),
        None => Ok(None),
    }
}
