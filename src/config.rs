//! Configuration module for stdio-relay.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values. The resolved
//! [`Config`] is validated before any process is spawned or socket opened.

use bytes::Bytes;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "stdio-relay")]
#[command(author = "stdio-relay authors")]
#[command(version = "0.1.0")]
#[command(
    about = "Relay a child process's stdout to a TCP peer, pausing on a handshake token",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Remote peer to connect to (e.g., 127.0.0.1:2331)
    #[arg(long)]
    pub connect: Option<String>,

    /// Token in the child's output that suspends forwarding (empty disables)
    #[arg(long)]
    pub suspend_token: Option<String>,

    /// Literal token from the peer that resumes forwarding
    #[arg(long)]
    pub resume_token: Option<String>,

    /// Start marker of the span the peer sends to resume forwarding
    #[arg(long)]
    pub resume_start: Option<String>,

    /// End marker of the span the peer sends to resume forwarding
    #[arg(long)]
    pub resume_end: Option<String>,

    /// Bytes read from the child per chunk
    #[arg(long)]
    pub chunk_capacity: Option<usize>,

    /// Bytes held while scanning the peer's resume handshake
    #[arg(long)]
    pub handshake_capacity: Option<usize>,

    /// Do not echo the child's output to the local console
    #[arg(long)]
    pub no_echo: bool,

    /// Leave the child's stderr on the relay's stderr instead of relaying it
    #[arg(long)]
    pub separate_stderr: bool,

    /// Replay held-back output before echoing the peer's resume span
    #[arg(long)]
    pub replay_first: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Child command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub handshake: HandshakeSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay-related configuration
#[derive(Debug, Deserialize)]
pub struct RelaySection {
    /// Remote peer address
    pub connect: Option<String>,
    /// Child command line
    #[serde(default)]
    pub command: Vec<String>,
    /// Bytes read from the child per chunk
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
    /// Echo the child's output to the local console
    #[serde(default = "default_true")]
    pub echo: bool,
    /// Relay the child's stderr through the same pipe as its stdout
    #[serde(default = "default_true")]
    pub merge_stderr: bool,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            connect: None,
            command: Vec::new(),
            chunk_capacity: default_chunk_capacity(),
            echo: true,
            merge_stderr: true,
        }
    }
}

/// Handshake-related configuration
#[derive(Debug, Deserialize)]
pub struct HandshakeSection {
    #[serde(default)]
    pub suspend_token: String,
    pub resume_token: Option<String>,
    pub resume_start: Option<String>,
    pub resume_end: Option<String>,
    /// Scan buffer size for the inbound side
    #[serde(default = "default_handshake_capacity")]
    pub capacity: usize,
    /// Echo the extracted span before replaying held-back output
    #[serde(default = "default_true")]
    pub echo_first: bool,
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self {
            suspend_token: String::new(),
            resume_token: None,
            resume_start: None,
            resume_end: None,
            capacity: default_handshake_capacity(),
            echo_first: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_chunk_capacity() -> usize {
    4096
}

fn default_handshake_capacity() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the peer must send to end a suspension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeRule {
    /// A literal token anywhere in the inbound stream.
    Literal(Bytes),
    /// A start marker followed by an end marker; the whole span is echoed.
    Delimited { start: Bytes, end: Bytes },
}

impl ResumeRule {
    /// Smallest number of inbound bytes that can complete this rule.
    pub fn min_span(&self) -> usize {
        match self {
            ResumeRule::Literal(token) => token.len(),
            ResumeRule::Delimited { start, end } => start.len() + end.len(),
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub connect: String,
    pub command: Vec<String>,
    pub chunk_capacity: usize,
    pub echo: bool,
    pub merge_stderr: bool,
    pub suspend_token: Bytes,
    pub resume: Option<ResumeRule>,
    pub handshake_capacity: usize,
    pub echo_first: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::from_sources(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn from_sources(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let TomlConfig {
            relay,
            handshake,
            logging,
        } = toml_config;

        // Any resume flag on the command line replaces the file's rule wholesale
        let resume = if cli.resume_token.is_some()
            || cli.resume_start.is_some()
            || cli.resume_end.is_some()
        {
            resume_rule(cli.resume_token, cli.resume_start, cli.resume_end)?
        } else {
            resume_rule(
                handshake.resume_token,
                handshake.resume_start,
                handshake.resume_end,
            )?
        };

        let suspend_token = cli.suspend_token.unwrap_or(handshake.suspend_token);

        let config = Config {
            connect: cli.connect.or(relay.connect).unwrap_or_default(),
            command: if cli.command.is_empty() {
                relay.command
            } else {
                cli.command
            },
            chunk_capacity: cli.chunk_capacity.unwrap_or(relay.chunk_capacity),
            echo: relay.echo && !cli.no_echo,
            merge_stderr: relay.merge_stderr && !cli.separate_stderr,
            suspend_token: Bytes::from(unescape(&suspend_token)?),
            resume,
            handshake_capacity: cli.handshake_capacity.unwrap_or(handshake.capacity),
            echo_first: handshake.echo_first && !cli.replay_first,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Whether a suspend token is configured.
    pub fn suspension_enabled(&self) -> bool {
        !self.suspend_token.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connect.is_empty() {
            return Err(invalid("no peer address; set --connect or [relay] connect"));
        }
        if self.command.is_empty() {
            return Err(invalid("no child command given"));
        }
        if self.chunk_capacity == 0 {
            return Err(invalid("chunk capacity must be at least 1 byte"));
        }
        if self.handshake_capacity == 0 {
            return Err(invalid("handshake capacity must be at least 1 byte"));
        }

        let suspend_len = self.suspend_token.len();
        if suspend_len > self.chunk_capacity {
            return Err(invalid(format!(
                "suspend token is {suspend_len} bytes, chunk capacity is {}",
                self.chunk_capacity
            )));
        }
        if suspend_len > self.handshake_capacity {
            return Err(invalid(format!(
                "suspend token is {suspend_len} bytes, handshake capacity is {}",
                self.handshake_capacity
            )));
        }

        if !self.suspension_enabled() {
            return Ok(());
        }

        let Some(resume) = &self.resume else {
            return Err(invalid(
                "a suspend token needs a resume token or resume markers",
            ));
        };
        match resume {
            ResumeRule::Literal(token) if token.is_empty() => {
                return Err(invalid("resume token must not be empty"));
            }
            ResumeRule::Delimited { start, end } if start.is_empty() || end.is_empty() => {
                return Err(invalid("resume markers must not be empty"));
            }
            _ => {}
        }
        if resume.min_span() > self.handshake_capacity {
            return Err(invalid(format!(
                "resume handshake needs {} bytes, handshake capacity is {}",
                resume.min_span(),
                self.handshake_capacity
            )));
        }

        Ok(())
    }
}

fn resume_rule(
    token: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<Option<ResumeRule>, ConfigError> {
    match (token, start, end) {
        (None, None, None) => Ok(None),
        (Some(token), None, None) => Ok(Some(ResumeRule::Literal(Bytes::from(unescape(
            &token,
        )?)))),
        (None, Some(start), Some(end)) => Ok(Some(ResumeRule::Delimited {
            start: Bytes::from(unescape(&start)?),
            end: Bytes::from(unescape(&end)?),
        })),
        (Some(_), _, _) => Err(invalid(
            "resume token and resume markers are mutually exclusive",
        )),
        (None, _, _) => Err(invalid("resume markers need both a start and an end")),
    }
}

/// Decode backslash escapes (`\r`, `\n`, `\t`, `\0`, `\\`, `\xHH`) in a token.
pub fn unescape(input: &str) -> Result<Vec<u8>, ConfigError> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'x') => {
                let hi = bytes.next().and_then(hex_digit);
                let lo = bytes.next().and_then(hex_digit);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                    _ => return Err(invalid(format!("bad \\x escape in {input:?}"))),
                }
            }
            Some(other) => {
                return Err(invalid(format!(
                    "unknown escape \\{} in {input:?}",
                    other as char
                )))
            }
            None => return Err(invalid(format!("dangling backslash in {input:?}"))),
        }
    }

    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileRead(_, e) => Some(e),
            ConfigError::TomlParse(_, e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}
