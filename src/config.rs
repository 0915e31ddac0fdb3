use crate::{DumpError, Result};
use clap::Parser;
use http::StatusCode;

/// Default port when neither `PORT` nor `--port` is given
pub const DEFAULT_PORT: u16 = 8080;
/// Default response status when neither `STATUS_CODE_RESPONSE` nor
/// `--status-code-response` is given
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// Command-line flags
///
/// Every flag is optional; a flag that is explicitly supplied overrides the
/// corresponding environment variable.
#[derive(Debug, Default, Parser)]
#[command(name = "dumpsrv", version, about = "HTTP request dumping echo server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Status code to respond with
    #[arg(long = "status-code-response", value_name = "CODE")]
    pub status_code_response: Option<u16>,

    /// Enable structured logs
    #[arg(
        long = "structured-logs",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub structured_logs: Option<bool>,
}

/// Resolved server configuration
///
/// Built once at startup from defaults, environment variables, and
/// command-line flags (in ascending precedence), then shared read-only with
/// every connection task.
///
/// # Examples
///
/// ```
/// use dumpsrv::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.status_code_response.as_u16(), 200);
/// assert!(!config.use_structured_logs);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the listener binds to
    pub port: u16,
    /// Status code returned with every successful echo response
    pub status_code_response: StatusCode,
    /// Whether log lines are wrapped as JSON objects
    pub use_structured_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            status_code_response: StatusCode::OK,
            use_structured_logs: false,
        }
    }
}

impl Config {
    /// Resolves the configuration from the process environment and the
    /// parsed command-line flags.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_from(cli, |key| std::env::var(key).ok())
    }

    /// Resolution against an injected environment lookup.
    ///
    /// Environment values are parsed before flag overrides are applied, so a
    /// malformed environment variable is an error even when the flag would
    /// have replaced it.
    pub fn resolve_from(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = match env("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| DumpError::Config(format!("invalid PORT value {raw:?}")))?,
            None => DEFAULT_PORT,
        };
        let port = cli.port.unwrap_or(env_port);
        if port == 0 {
            return Err(DumpError::Config(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        let env_status = match env("STATUS_CODE_RESPONSE") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                DumpError::Config(format!("invalid STATUS_CODE_RESPONSE value {raw:?}"))
            })?,
            None => DEFAULT_STATUS_CODE,
        };
        let code = cli.status_code_response.unwrap_or(env_status);
        let status_code_response = StatusCode::from_u16(code)
            .map_err(|_| DumpError::Config(format!("invalid status code {code}")))?;

        // Truthy only for the exact string "true"; everything else is false.
        let use_structured_logs = cli
            .structured_logs
            .unwrap_or_else(|| env("USE_STRUCTURED_LOGS").as_deref() == Some("true"));

        Ok(Self {
            port,
            status_code_response,
            use_structured_logs,
        })
    }
}
