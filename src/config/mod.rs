//! Configuration module for the tunnel.
//!
//! This module provides:
//! - [`types`]: raw configuration types as parsed from YAML
//! - [`validate`]: validation and creation of startable tunnel configs
//!
//! The main entry points are:
//! - [`load_configs`]: Load config files from disk
//! - [`create_tunnel_configs`]: Validate and create final tunnel configs

mod types;
mod validate;

pub use types::*;
pub use validate::{SealConfig, TunnelServerConfig, create_tunnel_configs};

/// Loads configuration files from the provided paths.
///
/// Reads each file, parses it as YAML, and returns the combined list of configs.
pub async fn load_configs(args: &[String]) -> std::io::Result<Vec<TunnelConfig>> {
    let mut all_configs = vec![];
    for config_filename in args {
        let config_bytes = match tokio::fs::read(config_filename).await {
            Ok(b) => b,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Could not read config file {config_filename}: {e}"),
                ));
            }
        };

        let config_str = match String::from_utf8(config_bytes) {
            Ok(s) => s,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Could not parse config file {config_filename} as UTF8: {e}"),
                ));
            }
        };

        let mut configs = match serde_yaml::from_str::<Vec<TunnelConfig>>(&config_str) {
            Ok(c) => c,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Could not parse config file {config_filename} as config YAML: {e}"),
                ));
            }
        };
        all_configs.append(&mut configs)
    }

    Ok(all_configs)
}
