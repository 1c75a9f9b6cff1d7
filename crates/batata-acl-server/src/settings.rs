//! Server settings
//!
//! Settings are layered: the YAML file (default `conf/acl.yml`), then
//! `BATATA_ACL_*` environment variables (`__` separates nested keys, e.g.
//! `BATATA_ACL_ACL__DEFAULT_POLICY=allow`), then command line flags.

use batata_acl::AclConfig;
use clap::Parser;
use config::{Config, Environment};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "conf/acl.yml";
pub const DEFAULT_PORT: u16 = 8500;

/// Command line arguments for the ACL server
#[derive(Debug, Default, Parser)]
#[command(name = "batata-acl-server", version, about = "Consul-compatible ACL API server")]
pub struct Cli {
    /// Settings file; a missing default file is tolerated, a missing explicit one is not
    #[arg(short = 'c', long = "config", env = "BATATA_ACL_CONFIG")]
    pub config: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    #[arg(short = 'd', long = "datacenter")]
    pub datacenter: Option<String>,
    #[arg(long = "disable-acl")]
    pub disable_acl: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub address: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            workers: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: Option<String>,
    pub console: bool,
    pub file: bool,
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            console: true,
            file: false,
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub acl: AclConfig,
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
        let mut builder = Config::builder()
            .add_source(config::File::with_name(path).required(cli.config.is_some()))
            .add_source(
                Environment::with_prefix("BATATA_ACL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(dc) = &cli.datacenter {
            builder = builder.set_override("acl.datacenter", dc.as_str())?;
        }
        if cli.disable_acl {
            builder = builder.set_override("acl.enabled", false)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.address.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use batata_acl::DefaultPolicy;

    use super::*;

    fn settings_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_values_are_read() {
        let file = settings_file(
            r#"
server:
  port: 18500
acl:
  datacenter: dc2
  primary_datacenter: dc1
  default_policy: allow
  token_ttl_secs: 5
  remote_datacenters:
    dc1: "http://10.0.0.1:8500"
"#,
        );
        let cli = Cli {
            config: Some(file.path().to_string_lossy().into_owned()),
            ..Cli::default()
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.server.port, 18500);
        assert_eq!(settings.acl.datacenter, "dc2");
        assert_eq!(settings.acl.primary_datacenter(), "dc1");
        assert_eq!(settings.acl.default_policy, DefaultPolicy::Allow);
        assert_eq!(settings.acl.token_ttl_secs, 5);
        assert_eq!(
            settings.acl.remote_datacenters.get("dc1").map(String::as_str),
            Some("http://10.0.0.1:8500")
        );
    }

    #[test]
    fn test_flags_override_file() {
        let file = settings_file("server:\n  port: 18500\nacl:\n  datacenter: dc2\n");
        let cli = Cli {
            config: Some(file.path().to_string_lossy().into_owned()),
            port: Some(9000),
            datacenter: Some("dc3".to_string()),
            disable_acl: true,
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.acl.datacenter, "dc3");
        assert!(!settings.acl.enabled);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let cli = Cli {
            config: Some("/nonexistent/batata-acl.yml".to_string()),
            ..Cli::default()
        };
        assert!(Settings::load(&cli).is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_address(), ("0.0.0.0".to_string(), DEFAULT_PORT));
        assert!(settings.acl.enabled);
        assert_eq!(settings.acl.default_policy, DefaultPolicy::Deny);
        assert!(!settings.log.file);
    }
}
