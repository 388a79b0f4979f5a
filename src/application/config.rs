use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;

pub const ENV_ENVIRONMENT: &str = "NODE_ENV";
pub const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";
pub const ENV_PHASE: &str = "BB_FUNCTIONS_PHASE";

pub const DEFAULT_RUNTIME_API: &str = "127.0.0.1:14113";
pub const DEFAULT_MANIFESTS_DIR: &str = ".browserbase/functions/manifests";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "funcbridge",
    version,
    about = "Local dev bridge for serverless browser-automation functions"
)]
pub struct Args {
    #[arg(long, env = "FUNCBRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "FUNCBRIDGE_PORT", default_value_t = 14113)]
    pub port: u16,

    #[arg(long, env = "FUNCBRIDGE_MANIFESTS_DIR", default_value = DEFAULT_MANIFESTS_DIR)]
    pub manifests_dir: PathBuf,

    #[arg(long, env = "FUNCBRIDGE_INVOKE_TIMEOUT_MS", default_value_t = 300_000)]
    pub invoke_timeout_ms: u64,

    #[arg(
        long,
        env = "BROWSERBASE_API_URL",
        default_value = "https://api.browserbase.com"
    )]
    pub session_api_url: String,

    #[arg(long, env = "BROWSERBASE_API_KEY")]
    pub session_api_key: Option<String>,

    #[arg(long, env = "BROWSERBASE_PROJECT_ID")]
    pub session_project_id: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "FUNCBRIDGE_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub manifests_dir: PathBuf,
    pub invoke_timeout: Duration,
    pub session_api_url: String,
    pub session_api_key: Option<String>,
    pub session_project_id: Option<String>,
    pub log_filter: String,
    pub json_logs: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        if args.port == 0 {
            return Err("port must be greater than 0".to_owned());
        }
        if args.invoke_timeout_ms == 0 {
            return Err("invoke_timeout_ms must be greater than 0".to_owned());
        }
        if args.session_api_url.trim().is_empty() {
            return Err("session_api_url must not be empty".to_owned());
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            manifests_dir: args.manifests_dir,
            invoke_timeout: Duration::from_millis(args.invoke_timeout_ms),
            session_api_url: args.session_api_url,
            session_api_key: normalize_secret(args.session_api_key),
            session_project_id: normalize_secret(args.session_project_id),
            log_filter: args.log_filter,
            json_logs: args.json_logs,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn for_test(host: IpAddr, port: u16, manifests_dir: PathBuf) -> Self {
        Self {
            host,
            port,
            manifests_dir,
            invoke_timeout: Duration::from_millis(5_000),
            session_api_url: "http://127.0.0.1:1".to_owned(),
            session_api_key: None,
            session_project_id: None,
            log_filter: "warn".to_owned(),
            json_logs: false,
        }
    }
}

/// Which fatal-error policy the runtime loop applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("production") => Self::Production,
            _ => Self::Local,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Production => "production",
        }
    }
}

/// Whether this handler process polls for work or only emits manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Runtime,
    Introspect,
}

impl Phase {
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("introspect") => Self::Introspect,
            _ => Self::Runtime,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Introspect => "introspect",
        }
    }
}

/// Snapshot of the process environment taken at construction. Later env
/// mutation does not affect an existing selector.
#[derive(Debug, Clone)]
pub struct PhaseSelector {
    pub environment: Environment,
    pub phase: Phase,
    pub runtime_api: String,
}

impl PhaseSelector {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            environment: Environment::parse(std::env::var(ENV_ENVIRONMENT).ok().as_deref()),
            phase: Phase::parse(std::env::var(ENV_PHASE).ok().as_deref()),
            runtime_api: std::env::var(ENV_RUNTIME_API)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RUNTIME_API.to_owned()),
        }
    }

    #[must_use]
    pub fn new(environment: Environment, phase: Phase, runtime_api: impl Into<String>) -> Self {
        Self {
            environment,
            phase,
            runtime_api: runtime_api.into(),
        }
    }

    /// Base URL of the bridge's runtime API.
    #[must_use]
    pub fn runtime_base_url(&self) -> String {
        format!("http://{}", self.runtime_api)
    }
}

fn normalize_secret(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}
