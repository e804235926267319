//! Parsing and validation of a router's configuration file.
//!
//! The file is line-oriented: blank lines and lines starting with `#` are
//! comments, everything else is `<parameter> <comma,separated,values>`. See
//! the module's tests for the full grammar this implements.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;

use crate::error::ConfigError;

const COMMENT_CHAR: char = '#';

/// A statically configured neighbor: who they are, where to send to them,
/// and the cost of the direct link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub id: u16,
    pub dest_port: u16,
    pub link_cost: u8,
}

/// The timer quantities that drive the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerConfig {
    pub periodic_base: f64,
    pub periodic_jitter: f64,
    pub route_timeout: f64,
    pub garbage_timeout: f64,
    pub trigger_min: f64,
    pub trigger_max: f64,
}

/// A fully parsed and validated router configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub router_id: u16,
    pub input_ports: Vec<u16>,
    pub outputs: Vec<Neighbor>,
    pub timers: TimerConfig,
    pub log_level: Option<LevelFilter>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let fields = parse_lines(&text)?;
        check_fields(fields)
    }
}

/// Parse the raw `name -> values` map out of the file text, rejecting
/// malformed lines and duplicate parameter names.
fn parse_lines(text: &str) -> Result<HashMap<&str, Vec<&str>>, ConfigError> {
    let mut fields = HashMap::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end();
        if line.is_empty() || line.starts_with(COMMENT_CHAR) {
            continue;
        }
        let mut parts = line.splitn(2, ' ');
        let (name, values) = match (parts.next(), parts.next()) {
            (Some(name), Some(values)) if !name.is_empty() && !values.is_empty() => {
                (name, values)
            }
            _ => return Err(ConfigError::Syntax { line: idx + 1 }),
        };
        let values: Vec<&str> = values.split(',').collect();
        if fields.insert(name, values).is_some() {
            return Err(ConfigError::Duplicate(name.to_string()));
        }
    }
    Ok(fields)
}

fn required<'a>(
    fields: &HashMap<&str, Vec<&'a str>>,
    name: &'static str,
) -> Result<&'a [&'a str], ConfigError> {
    fields
        .get(name)
        .map(|v| v.as_slice())
        .ok_or(ConfigError::Missing(name))
}

fn parse_single<T>(values: &[&str], name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    if values.len() != 1 {
        return Err(ConfigError::Range {
            parameter: name,
            reason: "must have exactly one value".to_string(),
        });
    }
    values[0].trim().parse().map_err(|_| ConfigError::Range {
        parameter: name,
        reason: format!("'{}' is not a valid number", values[0]),
    })
}

fn in_range<T: PartialOrd + fmt::Display>(
    value: T,
    lo: T,
    hi: T,
    name: &'static str,
) -> Result<T, ConfigError> {
    if value < lo || value > hi {
        Err(ConfigError::Range {
            parameter: name,
            reason: format!("{value} is out of range [{lo}, {hi}]"),
        })
    } else {
        Ok(value)
    }
}

fn check_fields(fields: HashMap<&str, Vec<&str>>) -> Result<Config, ConfigError> {
    let router_id: u16 = parse_single(required(&fields, "router-id")?, "router-id")?;
    let router_id = in_range(router_id, 1, 65535, "router-id")?;

    let input_ports = required(&fields, "input-ports")?
        .iter()
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Range {
                    parameter: "input-ports",
                    reason: format!("'{v}' is not a valid port"),
                })
                .and_then(|p| in_range(p, 1024, 64000, "input-ports"))
        })
        .collect::<Result<Vec<u16>, _>>()?;
    if input_ports.is_empty() {
        return Err(ConfigError::Range {
            parameter: "input-ports",
            reason: "at least one port is required".to_string(),
        });
    }
    let mut seen_inputs = std::collections::HashSet::new();
    for &p in &input_ports {
        if !seen_inputs.insert(p) {
            return Err(ConfigError::Range {
                parameter: "input-ports",
                reason: format!("duplicate port {p}"),
            });
        }
    }

    let outputs = required(&fields, "outputs")?
        .iter()
        .map(|entry| parse_output(entry))
        .collect::<Result<Vec<Neighbor>, _>>()?;
    if outputs.is_empty() {
        return Err(ConfigError::Range {
            parameter: "outputs",
            reason: "at least one neighbor is required".to_string(),
        });
    }
    for n in &outputs {
        if seen_inputs.contains(&n.dest_port) {
            return Err(ConfigError::PortCollision(n.dest_port));
        }
    }

    let periodic_base: f64 = parse_single(required(&fields, "timeout-default")?, "timeout-default")?;
    if periodic_base <= 0.0 {
        return Err(ConfigError::Range {
            parameter: "timeout-default",
            reason: "must be positive".to_string(),
        });
    }
    let periodic_jitter: f64 = parse_single(required(&fields, "timeout-delta")?, "timeout-delta")?;
    if periodic_jitter < 0.0 || periodic_jitter > periodic_base {
        return Err(ConfigError::Range {
            parameter: "timeout-delta",
            reason: "must be non-negative and no greater than timeout-default".to_string(),
        });
    }

    let route_timeout: f64 = parse_single(required(&fields, "route-timeout")?, "route-timeout")?;
    if route_timeout <= 0.0 {
        return Err(ConfigError::Range {
            parameter: "route-timeout",
            reason: "must be positive".to_string(),
        });
    }
    let garbage_timeout: f64 = parse_single(required(&fields, "garbage-timeout")?, "garbage-timeout")?;
    if garbage_timeout <= route_timeout {
        return Err(ConfigError::Range {
            parameter: "garbage-timeout",
            reason: "must be greater than route-timeout".to_string(),
        });
    }

    let trigger_values = required(&fields, "trigger-timeout")?;
    if trigger_values.len() != 2 {
        return Err(ConfigError::Range {
            parameter: "trigger-timeout",
            reason: "must have exactly two values 'a,b'".to_string(),
        });
    }
    let trigger_min: f64 = trigger_values[0].trim().parse().map_err(|_| ConfigError::Range {
        parameter: "trigger-timeout",
        reason: format!("'{}' is not a valid number", trigger_values[0]),
    })?;
    let trigger_max: f64 = trigger_values[1].trim().parse().map_err(|_| ConfigError::Range {
        parameter: "trigger-timeout",
        reason: format!("'{}' is not a valid number", trigger_values[1]),
    })?;
    if trigger_min >= trigger_max {
        return Err(ConfigError::Range {
            parameter: "trigger-timeout",
            reason: "first value must be less than the second".to_string(),
        });
    }

    let log_level = match fields.get("log-level") {
        Some(values) if values.len() == 1 => {
            let raw = values[0].trim();
            Some(raw.parse::<LevelFilter>().map_err(|_| ConfigError::Range {
                parameter: "log-level",
                reason: format!("'{raw}' is not a recognized log level"),
            })?)
        }
        Some(_) => {
            return Err(ConfigError::Range {
                parameter: "log-level",
                reason: "must have exactly one value".to_string(),
            })
        }
        None => None,
    };

    Ok(Config {
        router_id,
        input_ports,
        outputs,
        timers: TimerConfig {
            periodic_base,
            periodic_jitter,
            route_timeout,
            garbage_timeout,
            trigger_min,
            trigger_max,
        },
        log_level,
    })
}

fn parse_output(entry: &str) -> Result<Neighbor, ConfigError> {
    let parts: Vec<&str> = entry.split('-').collect();
    if parts.len() != 3 {
        return Err(ConfigError::Range {
            parameter: "outputs",
            reason: format!("'{entry}' must be 'port-metric-id'"),
        });
    }
    let port: u16 = parts[0].trim().parse().map_err(|_| ConfigError::Range {
        parameter: "outputs",
        reason: format!("'{}' is not a valid port", parts[0]),
    })?;
    let port = in_range(port, 1024, 64000, "outputs")?;
    let metric: u32 = parts[1].trim().parse().map_err(|_| ConfigError::Range {
        parameter: "outputs",
        reason: format!("'{}' is not a valid metric", parts[1]),
    })?;
    let metric = in_range(metric, 0, 16, "outputs")? as u8;
    let id: u32 = parts[2].trim().parse().map_err(|_| ConfigError::Range {
        parameter: "outputs",
        reason: format!("'{}' is not a valid router id", parts[2]),
    })?;
    let id = in_range(id, 1, 65535, "outputs")? as u16;
    Ok(Neighbor {
        id,
        dest_port: port,
        link_cost: metric,
    })
}
