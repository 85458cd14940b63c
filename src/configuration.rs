//! Command-line configuration and validation.

use std::{path::PathBuf, time::Duration};

pub use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::{
    client::{DEFAULT_DELAY, DEFAULT_LIMIT},
    security::{Credentials, SecurityMode, TlsFiles, DEFAULT_AUTHORITY},
    server::DEFAULT_PORT,
    stats::OutputFormat,
};

/// Errors detected while validating the command line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Delay between pings must be greater than zero")]
    ZeroDelay,

    #[error("Port must be greater than zero")]
    ZeroPort,

    #[error("Sender name must not be empty")]
    EmptyName,

    #[error("No hostname for the pinger: {0}")]
    NoHostname(String),
}

#[derive(Parser, Debug)]
#[command(name = "sping", version, about = "Simple, secure ping over an echo RPC", long_about = None)]
pub struct Configuration {
    #[command(subcommand)]
    pub command: Command,

    /// Do not print per-ping lines
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the ping server
    Serve(ServeOptions),
    /// Run the ping client against a server
    Echo(EchoOptions),
}

/// Transport security flags shared by both subcommands.
#[derive(clap::Args, Debug, Clone)]
pub struct TlsOptions {
    /// Transport security mode
    #[arg(short, long, value_enum, default_value_t = SecurityMode::MutualTls)]
    pub mode: SecurityMode,
    /// Certificate this side presents (defaults to cert/client.crt or cert/server.crt)
    #[arg(long)]
    pub cert: Option<PathBuf>,
    /// Private key for --cert (defaults to cert/client.key or cert/server.key)
    #[arg(long)]
    pub key: Option<PathBuf>,
    /// CA bundle used to verify the peer
    #[arg(long, default_value = DEFAULT_AUTHORITY)]
    pub ca: PathBuf,
}

impl TlsOptions {
    fn files(&self, defaults: TlsFiles) -> TlsFiles {
        TlsFiles {
            certificate: self.cert.clone().unwrap_or(defaults.certificate),
            private_key: self.key.clone().unwrap_or(defaults.private_key),
            authority: self.ca.clone(),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ServeOptions {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Forget senders silent for this many seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    pub idle_timeout: u64,
    #[command(flatten)]
    pub tls: TlsOptions,
}

impl ServeOptions {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.tls.mode, self.tls.files(TlsFiles::server_defaults()))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout > 0 {
            Some(Duration::from_secs(self.idle_timeout))
        } else {
            None
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct EchoOptions {
    /// Host to ping
    pub host: String,
    /// Port to ping to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Name of the client (defaults to the hostname)
    #[arg(short, long)]
    pub name: Option<String>,
    /// Max number of pings to send
    #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
    pub limit: u32,
    /// Delay between pings in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_DELAY.as_millis() as u64)]
    pub delay: u64,
    /// Name expected in the server certificate (defaults to HOST)
    #[arg(long)]
    pub server_name: Option<String>,
    /// Format of the final summary
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(flatten)]
    pub tls: TlsOptions,
}

impl EchoOptions {
    /// `host:port` to dial; IPv6 literals are bracketed.
    pub fn target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn credentials(&self) -> Credentials {
        let credentials =
            Credentials::new(self.tls.mode, self.tls.files(TlsFiles::client_defaults()));
        match self.server_name {
            Some(ref name) => credentials.with_server_name(name.clone()),
            None => credentials,
        }
    }

    /// Explicit `--name`, or the local hostname.
    pub fn sender_name(&self) -> Result<String, ConfigurationError> {
        let name = match self.name {
            Some(ref name) => name.clone(),
            None => hostname()?,
        };
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        Ok(name)
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.command {
            Command::Serve(_) => Ok(()),
            Command::Echo(ref echo) => {
                if echo.delay == 0 {
                    return Err(ConfigurationError::ZeroDelay);
                }
                if echo.port == 0 {
                    return Err(ConfigurationError::ZeroPort);
                }
                if matches!(echo.name, Some(ref name) if name.trim().is_empty()) {
                    return Err(ConfigurationError::EmptyName);
                }
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn hostname() -> Result<String, ConfigurationError> {
    nix::unistd::gethostname()
        .map_err(|e| ConfigurationError::NoHostname(e.to_string()))?
        .into_string()
        .map_err(|_| ConfigurationError::NoHostname("hostname is not valid UTF-8".to_string()))
}

#[cfg(not(unix))]
fn hostname() -> Result<String, ConfigurationError> {
    std::env::var("COMPUTERNAME").map_err(|e| ConfigurationError::NoHostname(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Configuration {
        Configuration::try_parse_from(args).unwrap()
    }

    fn echo_options(conf: &Configuration) -> &EchoOptions {
        match conf.command {
            Command::Echo(ref echo) => echo,
            _ => panic!("expected echo subcommand"),
        }
    }

    #[test]
    fn test_echo_defaults() {
        let conf = parse(&["sping", "echo", "localhost"]);
        assert_eq!(conf.validate(), Ok(()));
        assert!(!conf.quiet);

        let echo = echo_options(&conf);
        assert_eq!(echo.target(), "localhost:3264");
        assert_eq!(echo.limit, 8);
        assert_eq!(echo.delay(), Duration::from_millis(100));
        assert_eq!(echo.format, OutputFormat::Text);

        let creds = echo.credentials();
        assert_eq!(creds.mode, SecurityMode::MutualTls);
        assert_eq!(creds.files, TlsFiles::client_defaults());
        assert_eq!(creds.server_name, None);
    }

    #[test]
    fn test_echo_overrides() {
        let conf = parse(&[
            "sping",
            "echo",
            "::1",
            "-p",
            "5000",
            "-n",
            "alice",
            "-l",
            "3",
            "-d",
            "250",
            "--mode",
            "tls",
            "--ca",
            "/etc/sping/ca.pem",
            "--server-name",
            "ping.example.org",
            "--format",
            "json",
            "-q",
        ]);
        assert!(conf.quiet);

        let echo = echo_options(&conf);
        assert_eq!(echo.target(), "[::1]:5000");
        assert_eq!(echo.sender_name().unwrap(), "alice");
        assert_eq!(echo.limit, 3);
        assert_eq!(echo.delay(), Duration::from_millis(250));
        assert_eq!(echo.format, OutputFormat::Json);

        let creds = echo.credentials();
        assert_eq!(creds.mode, SecurityMode::ServerTls);
        assert_eq!(creds.files.authority, PathBuf::from("/etc/sping/ca.pem"));
        assert_eq!(creds.server_name.as_deref(), Some("ping.example.org"));
    }

    #[test]
    fn test_serve_defaults() {
        let conf = parse(&["sping", "serve"]);
        assert_eq!(conf.validate(), Ok(()));

        let Command::Serve(ref serve) = conf.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(serve.port, 3264);
        assert_eq!(serve.idle_timeout(), None);
        assert_eq!(serve.credentials().files, TlsFiles::server_defaults());
    }

    #[test]
    fn test_serve_custom_files() {
        let conf = parse(&[
            "sping",
            "serve",
            "--mode",
            "insecure",
            "--cert",
            "a.crt",
            "--key",
            "a.key",
            "--idle-timeout",
            "30",
        ]);
        let Command::Serve(ref serve) = conf.command else {
            panic!("expected serve subcommand");
        };
        let creds = serve.credentials();
        assert_eq!(creds.mode, SecurityMode::Insecure);
        assert_eq!(creds.files.certificate, PathBuf::from("a.crt"));
        assert_eq!(creds.files.private_key, PathBuf::from("a.key"));
        assert_eq!(serve.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validate_rejects_bad_echo() {
        let conf = parse(&["sping", "echo", "localhost", "-d", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroDelay));

        let conf = parse(&["sping", "echo", "localhost", "-p", "0"]);
        assert_eq!(conf.validate(), Err(ConfigurationError::ZeroPort));

        let conf = parse(&["sping", "echo", "localhost", "-n", " "]);
        assert_eq!(conf.validate(), Err(ConfigurationError::EmptyName));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Configuration::try_parse_from(["sping", "serve", "--mode", "plain"]).is_err());
    }

    #[test]
    fn test_echo_requires_host() {
        assert!(Configuration::try_parse_from(["sping", "echo"]).is_err());
    }
}
