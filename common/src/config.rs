//! # Scanner Configuration
//!
//! Loaded once at startup from a YAML file. The required keys mirror the
//! long-standing `config.yaml` layout; everything under `dns`, `snmp` and
//! `shodan` is optional and falls back to sensible defaults.
//!
//! ```yaml
//! database:
//!   path: resolver_cache.db
//! cache_expiry: 86400
//! shodan_api_key: "..."
//! asns: [AS3320, 8881]
//! domains_to_test: [example.com, wikipedia.org]
//! success_threshold: 50
//! snmp_communities: [public, private]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::error::ConfigError;
use crate::scan::Signature;

/// Environment variable that overrides `shodan_api_key`.
pub const API_KEY_ENV: &str = "EXPOSR_SHODAN_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,

    /// Seconds a cached verdict is trusted without re-probing.
    pub cache_expiry: u64,

    #[serde(default)]
    pub shodan_api_key: String,

    /// Autonomous systems scoping the DNS resolver discovery queries.
    #[serde(deserialize_with = "deserialize_asns")]
    pub asns: Vec<String>,

    /// Ordered probe domains resolved through each DNS candidate.
    pub domains_to_test: Vec<String>,

    /// Percentage of probe domains that must resolve (0-100).
    pub success_threshold: u32,

    /// Ordered community strings, most common defaults first.
    pub snmp_communities: Vec<String>,

    /// Run the SNMP discovery query after the DNS queries.
    #[serde(default = "default_true")]
    pub snmp_scan: bool,

    /// Upper bound on probes in flight at once. `1` keeps the scan strictly
    /// sequential.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub snmp: SnmpConfig,

    #[serde(default)]
    pub shodan: ShodanConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_dns_timeout(),
            port: default_dns_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    #[serde(default = "default_snmp_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default)]
    pub version: SnmpProtocol,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_snmp_timeout(),
            port: default_snmp_port(),
            version: SnmpProtocol::default(),
        }
    }
}

/// SNMP message version used for community probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpProtocol {
    #[default]
    V1,
    V2c,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShodanConfig {
    #[serde(default = "default_shodan_url")]
    pub base_url: String,
    #[serde(default = "default_shodan_timeout")]
    pub timeout_secs: u64,
}

impl Default for ShodanConfig {
    fn default() -> Self {
        Self {
            base_url: default_shodan_url(),
            timeout_secs: default_shodan_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_in_flight() -> usize {
    1
}

fn default_dns_timeout() -> u64 {
    2000
}

fn default_dns_port() -> u16 {
    53
}

fn default_snmp_timeout() -> u64 {
    1000
}

fn default_snmp_port() -> u16 {
    161
}

fn default_shodan_url() -> String {
    String::from("https://api.shodan.io")
}

fn default_shodan_timeout() -> u64 {
    30
}

/// ASNs show up both as `AS3320` strings and as bare numbers.
fn deserialize_asns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Asn {
        Number(u64),
        Text(String),
    }

    let raw: Vec<Asn> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|asn| match asn {
            Asn::Number(n) => format!("AS{n}"),
            Asn::Text(s) => s.trim().to_string(),
        })
        .collect())
}

impl Config {
    /// Reads, parses and validates the config file, applying the API key
    /// environment override on the way.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.override_api_key(std::env::var(API_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn override_api_key(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.shodan_api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("database.path", "must not be empty"));
        }
        if self.shodan_api_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "shodan_api_key",
                format!("missing (set it in the file or via {API_KEY_ENV})"),
            ));
        }
        if self.success_threshold > 100 {
            return Err(ConfigError::invalid(
                "success_threshold",
                format!("{} is not a percentage", self.success_threshold),
            ));
        }
        if self.domains_to_test.is_empty() {
            return Err(ConfigError::invalid(
                "domains_to_test",
                "at least one probe domain is required",
            ));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::invalid("max_in_flight", "must be at least 1"));
        }
        if self.dns.timeout_ms == 0 {
            return Err(ConfigError::invalid("dns.timeout_ms", "must be positive"));
        }
        if self.snmp.timeout_ms == 0 {
            return Err(ConfigError::invalid("snmp.timeout_ms", "must be positive"));
        }
        if self.asns.is_empty() && !self.snmp_scan {
            warn!("No ASNs configured and the SNMP scan is disabled; nothing to do");
        }
        if self.snmp_scan && self.snmp_communities.is_empty() {
            warn!("No SNMP communities configured; every SNMP candidate will be reported closed");
        }
        Ok(())
    }

    /// Discovery queries in execution order: one per ASN, then the SNMP sweep.
    pub fn scan_plan(&self) -> Vec<Signature> {
        let mut plan: Vec<Signature> = self
            .asns
            .iter()
            .map(|asn| Signature::DnsRecursion { asn: asn.clone() })
            .collect();
        if self.snmp_scan {
            plan.push(Signature::SnmpDefaultCommunity);
        }
        plan
    }
}
