use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Deserializer, de};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use url::Url;

/// Timeout applied when a module leaves `timeout` unset or zero
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Port appended to targets without one when a module leaves `port` unset or zero
pub const DEFAULT_PORT: u16 = 443;

/// Name of the module used when a request does not ask for one
pub const DEFAULT_MODULE: &str = "default";

/// Exporter configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modules: HashMap<String, Module>,
    /// Targets probed by the scheduled collector
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Probe policy for one class of targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Module {
    #[serde(default)]
    pub prober: ProberKind,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub validate_chain: bool,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub client_cert: Option<ClientCert>,
    /// PEM bundle of trust anchors, replaces the bundled web roots when set
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

/// Client certificate and key used for mutual TLS
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientCert {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Transport framing beneath the TLS layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProberKind {
    #[default]
    Tcp,
    /// Reserved, not implemented by the probe engine
    Http,
}

impl fmt::Display for ProberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Http => f.write_str("http"),
        }
    }
}

impl Module {
    /// Timeout covering DNS, TCP connect and TLS handshake
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        if self.port == 0 { DEFAULT_PORT } else { self.port }
    }

    /// Parse the configured proxy URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse, is not `http`, or has no host
    pub fn proxy(&self) -> Result<Option<Url>> {
        let Some(raw) = self.proxy_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw).with_context(|| format!("invalid proxy_url: {raw}"))?;
        if url.scheme() != "http" {
            bail!(
                "unsupported proxy scheme {:?} in {raw}, only http CONNECT proxies are supported",
                url.scheme()
            );
        }
        if url.host_str().is_none_or(str::is_empty) {
            bail!("proxy_url has no host: {raw}");
        }
        Ok(Some(url))
    }

    /// Check the module without touching the filesystem or network
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        self.proxy()?;
        if let Some(client_cert) = &self.client_cert
            && (client_cert.cert_file.as_os_str().is_empty()
                || client_cert.key_file.as_os_str().is_empty())
        {
            bail!("client_cert requires both cert_file and key_file");
        }
        Ok(())
    }
}

impl Config {
    /// Read, parse and validate a YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = data
            .parse()
            .with_context(|| format!("failed to load config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate every module and require a default one
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending module
    pub fn validate(&self) -> Result<()> {
        if !self.modules.contains_key(DEFAULT_MODULE) {
            bail!("no {DEFAULT_MODULE} module found in configuration");
        }
        for (name, module) in &self.modules {
            module
                .validate()
                .with_context(|| format!("invalid module {name}"))?;
        }
        if self.targets.iter().any(|target| target.trim().is_empty()) {
            bail!("targets must not contain empty entries");
        }
        Ok(())
    }

    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = serde_yaml::from_str(s).context("invalid YAML")?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a Go-style duration such as `5s`, `1m30s` or `250ms`
///
/// A bare `0` is accepted and means "unset".
///
/// # Errors
///
/// Returns an error if the string is empty, has no unit, or uses an unknown unit
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| anyhow!("missing unit in duration {input:?}"))?;
        if digits == 0 {
            bail!("invalid duration {input:?}");
        }
        let (number, tail) = rest.split_at(digits);
        let value: f64 = number
            .parse()
            .with_context(|| format!("invalid number in duration {input:?}"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let seconds = match unit {
            "ns" => value / 1e9,
            "us" | "µs" => value / 1e6,
            "ms" => value / 1e3,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => bail!("unknown unit {unit:?} in duration {input:?}"),
        };
        let part = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("duration out of range: {input:?}"))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| anyhow!("duration out of range: {input:?}"))?;
        rest = next;
    }
    Ok(total)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"5s\" or a number of seconds")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("negative duration: {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(|e| E::custom(format!("{e:#}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
