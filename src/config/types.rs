use serde::Deserialize;

/// Environment variable consulted when the config file carries no credential
pub const CREDENTIAL_ENV_VAR: &str = "LMS_CREDENTIAL";

/// Main configuration structure for an archive run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
}

/// Portal location and authentication
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Catalog page holding the course-category selector
    #[serde(rename = "root-url")]
    pub root_url: String,

    /// Opaque credential sent with every request (usually a session cookie)
    #[serde(default)]
    pub credential: Option<String>,

    /// Header the credential is sent under
    #[serde(rename = "credential-header", default = "default_credential_header")]
    pub credential_header: String,
}

impl PortalConfig {
    /// Returns the credential from the config file, falling back to the environment
    pub fn resolved_credential(&self) -> Option<String> {
        self.credential
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| std::env::var(CREDENTIAL_ENV_VAR).ok())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Worker pool and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Total attempts for a transient failure before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds), doubled per attempt
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single retry delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root of the artifact tree (`semesters/`, `courses/`, `users/`)
    pub directory: String,

    /// Optional SQLite file receiving extracted metadata
    #[serde(rename = "index-path", default)]
    pub index_path: Option<String>,
}

/// Initial frontier contents
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Seed the catalog discovery task
    #[serde(default = "default_true")]
    pub catalog: bool,

    /// First user id of a profile sweep (inclusive)
    #[serde(rename = "user-id-min", default)]
    pub user_id_min: Option<u64>,

    /// Last user id of a profile sweep (inclusive)
    #[serde(rename = "user-id-max", default)]
    pub user_id_max: Option<u64>,

    /// File listing extra user ids, one per line
    #[serde(rename = "user-id-file", default)]
    pub user_id_file: Option<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            catalog: true,
            user_id_min: None,
            user_id_max: None,
            user_id_file: None,
        }
    }
}

impl SeedConfig {
    /// Returns true if any user-id seed source is configured
    pub fn has_user_seeds(&self) -> bool {
        self.user_id_min.is_some() || self.user_id_max.is_some() || self.user_id_file.is_some()
    }
}

fn default_credential_header() -> String {
    "Cookie".to_string()
}

fn default_workers() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
