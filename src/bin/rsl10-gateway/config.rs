use std::env;
use std::time::Duration;

use rsl10_serial::registry::{AuthorizationPolicy, MAX_DEVICES};
use rsl10_serial::sensor::DeviceAddress;

const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub telemetry_interval: Duration,
    pub policy: AuthorizationPolicy,
    pub authorized: Vec<DeviceAddress>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let serial_port = env::var("RSL10_SERIAL_PORT")
            .map_err(|_| "RSL10_SERIAL_PORT environment variable not set")?;

        let baud_rate = match env::var("RSL10_BAUD_RATE") {
            Ok(v) => v
                .trim()
                .parse()
                .map_err(|e| format!("invalid RSL10_BAUD_RATE '{}': {}", v, e))?,
            Err(_) => DEFAULT_BAUD_RATE,
        };

        let interval_secs = match env::var("RSL10_TELEMETRY_INTERVAL_SECS") {
            Ok(v) => v
                .trim()
                .parse()
                .map_err(|e| format!("invalid RSL10_TELEMETRY_INTERVAL_SECS '{}': {}", v, e))?,
            Err(_) => DEFAULT_TELEMETRY_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            return Err("RSL10_TELEMETRY_INTERVAL_SECS must be greater than 0".into());
        }

        let policy = match env::var("RSL10_REQUIRE_AUTHORIZATION") {
            Ok(v) if parse_bool(&v)? => AuthorizationPolicy::AllowList,
            _ => AuthorizationPolicy::AllowAll,
        };

        let authorized = match env::var("RSL10_AUTHORIZED_MACS") {
            Ok(v) => parse_addresses(&v)?,
            Err(_) => Vec::new(),
        };

        if policy == AuthorizationPolicy::AllowList && authorized.is_empty() {
            return Err(
                "RSL10_REQUIRE_AUTHORIZATION is set but RSL10_AUTHORIZED_MACS lists no devices"
                    .into(),
            );
        }

        Ok(GatewayConfig {
            serial_port,
            baud_rate,
            telemetry_interval: Duration::from_secs(interval_secs),
            policy,
            authorized,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("invalid boolean '{}'", other)),
    }
}

fn parse_addresses(value: &str) -> Result<Vec<DeviceAddress>, String> {
    let mut addresses = Vec::new();
    for mac in value.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        let address = mac
            .parse::<DeviceAddress>()
            .map_err(|e| format!("invalid address '{}' in RSL10_AUTHORIZED_MACS: {}", mac, e))?;
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    if addresses.len() > MAX_DEVICES {
        return Err(format!(
            "RSL10_AUTHORIZED_MACS lists {} devices, at most {} are supported",
            addresses.len(),
            MAX_DEVICES
        ));
    }
    Ok(addresses)
}
