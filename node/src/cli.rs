//! # CLI & Environment Configuration
//!
//! The node is configured through flags with environment fallbacks:
//! `DEBUG`, `PORT`, `API_PORT`, `INTERVAL` and `DNS_SEED`. The forge
//! interval is a compound duration string (`20m`, `90s`, `1h30m`); an
//! unparsable value falls back to the default instead of failing startup.

use std::time::Duration;

use clap::Parser;
use ember_protocol::config;

/// EMBER proof-of-stake validator node.
#[derive(Parser, Debug)]
#[command(name = "ember-node", about = "EMBER proof-of-stake validator node", version)]
pub struct NodeCli {
    /// Enable debug logging.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    /// P2P listen port.
    #[arg(long, env = "PORT", default_value_t = config::DEFAULT_P2P_PORT)]
    pub port: u16,

    /// HTTP API listen port.
    #[arg(long, env = "API_PORT", default_value_t = config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Forge tick interval, e.g. "20m", "90s", "1h30m".
    #[arg(long, env = "INTERVAL", default_value = config::DEFAULT_FORGE_INTERVAL)]
    pub interval: String,

    /// DNS seed (host:port) to register this node with at startup.
    #[arg(long, env = "DNS_SEED", default_value = config::DEFAULT_DNS_SEED)]
    pub dns_seed: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl NodeCli {
    /// The forge interval as a duration, defaulting when unparsable.
    pub fn forge_interval(&self) -> Duration {
        parse_interval(&self.interval)
            .unwrap_or(Duration::from_secs(config::DEFAULT_FORGE_INTERVAL_SECS))
    }
}

/// Parses a compound duration string made of `<integer><unit>` segments,
/// with units `h`, `m`, `s` and `ms`. Returns `None` on anything else,
/// including a zero total.
pub fn parse_interval(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let value: u64 = digits.parse().ok()?;
        digits.clear();

        total += match c {
            'h' => Duration::from_secs(value * 3600),
            's' => Duration::from_secs(value),
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::from_millis(value)
            }
            'm' => Duration::from_secs(value * 60),
            _ => return None,
        };
    }

    // A trailing number without a unit is malformed.
    if !digits.is_empty() || total.is_zero() {
        return None;
    }

    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NodeCli::command().debug_assert();
    }

    #[test]
    fn parse_simple_intervals() {
        assert_eq!(parse_interval("20m"), Some(Duration::from_secs(1200)));
        assert_eq!(parse_interval("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_interval("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_interval("500ms"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn parse_compound_intervals() {
        assert_eq!(parse_interval("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_interval("1m30s"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn malformed_intervals_are_rejected() {
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("20"), None);
        assert_eq!(parse_interval("m"), None);
        assert_eq!(parse_interval("20x"), None);
        assert_eq!(parse_interval("0s"), None);
        assert_eq!(parse_interval("twenty minutes"), None);
    }

    #[test]
    fn default_interval_parses() {
        assert_eq!(
            parse_interval(config::DEFAULT_FORGE_INTERVAL),
            Some(Duration::from_secs(config::DEFAULT_FORGE_INTERVAL_SECS))
        );
    }

    #[test]
    fn invalid_interval_falls_back_to_the_default() {
        let cli = NodeCli::parse_from(["ember-node", "--interval", "garbage"]);
        assert_eq!(
            cli.forge_interval(),
            Duration::from_secs(config::DEFAULT_FORGE_INTERVAL_SECS)
        );
    }

    #[test]
    fn defaults_match_the_protocol_constants() {
        let cli = NodeCli::parse_from(["ember-node"]);
        assert_eq!(cli.port, config::DEFAULT_P2P_PORT);
        assert_eq!(cli.api_port, config::DEFAULT_API_PORT);
        assert_eq!(cli.dns_seed, config::DEFAULT_DNS_SEED);
        assert!(!cli.debug);
    }
}
