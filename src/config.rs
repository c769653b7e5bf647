use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{info, warn};

use crate::project::LayoutConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "PALLET_PATTERN_API_HOST";
    const PORT_VAR: &'static str = "PALLET_PATTERN_API_PORT";

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => parse_port(&raw).unwrap_or(Self::DEFAULT_PORT),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(value) if value != 0 => Some(value),
        Ok(_) => {
            warn!("⚠️ {} must not be 0. Using default.", ApiConfig::PORT_VAR);
            None
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using default.",
                ApiConfig::PORT_VAR,
                raw,
                err
            );
            None
        }
    }
}

/// Configuration of the layout engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    layout: LayoutConfig,
}

impl EngineConfig {
    const CONTACT_GAP_VAR: &'static str = "PALLET_PATTERN_CONTACT_GAP";
    const SWAP_CHAIN_ENDS_VAR: &'static str = "PALLET_PATTERN_SWAP_CHAIN_ENDS";

    pub fn from_env() -> Self {
        Self::from_raw(
            env_string(Self::CONTACT_GAP_VAR).as_deref(),
            env_string(Self::SWAP_CHAIN_ENDS_VAR).as_deref(),
        )
    }

    /// Builds the engine settings from raw variable values; unset or
    /// rejected values keep the layout defaults.
    fn from_raw(contact_gap: Option<&str>, swap_chain_ends: Option<&str>) -> Self {
        let contact_gap = contact_gap
            .and_then(|raw| parse_contact_gap(raw, Self::CONTACT_GAP_VAR))
            .unwrap_or(LayoutConfig::DEFAULT_CONTACT_GAP);

        let swap_chain_ends = swap_chain_ends
            .and_then(|raw| parse_bool(raw, Self::SWAP_CHAIN_ENDS_VAR))
            .unwrap_or(LayoutConfig::DEFAULT_SWAP_CHAIN_ENDS);
        if swap_chain_ends {
            info!("🔁 Chain end swap enabled for vertical chains from corner 1 and 4");
        }

        let layout = LayoutConfig::builder()
            .contact_gap(contact_gap)
            .swap_chain_ends(swap_chain_ends)
            .build();

        Self { layout }
    }

    /// Returns the configured LayoutConfig.
    pub fn layout_config(&self) -> LayoutConfig {
        self.layout.clone()
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Contact gap in millimetres; widening it turns gripper positions next to
/// near-touching units into blocked ones.
fn parse_contact_gap(raw: &str, var_name: &str) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(value) if (0.0..=10.0).contains(&value) => {
            if (value - LayoutConfig::DEFAULT_CONTACT_GAP).abs() > f64::EPSILON {
                info!("📏 Contact gap set to {} mm ({})", value, var_name);
            }
            Some(value)
        }
        Ok(value) => {
            warn!(
                "⚠️ {} must be between 0 and 10 (got {}). Using {}.",
                var_name,
                value,
                LayoutConfig::DEFAULT_CONTACT_GAP
            );
            None
        }
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                var_name,
                raw,
                err,
                LayoutConfig::DEFAULT_CONTACT_GAP
            );
            None
        }
    }
}
