use std::net::{IpAddr, UdpSocket};
use std::path::Path;

use super::{read_file, TelemetryError};

/// Any routable address works; nothing is sent, `connect` only selects a route.
const ROUTE_PROBE: &str = "10.254.254.254:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Address the kernel would use for outbound traffic.
pub fn local_ip() -> Result<IpAddr, TelemetryError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|err| TelemetryError::Unavailable(format!("no socket: {}", err)))?;
    socket
        .connect(ROUTE_PROBE)
        .map_err(|err| TelemetryError::Unavailable(format!("no route: {}", err)))?;
    let ip = socket
        .local_addr()
        .map_err(|err| TelemetryError::Unavailable(err.to_string()))?
        .ip();
    if ip.is_unspecified() {
        return Err(TelemetryError::Unavailable("no address assigned".to_string()));
    }
    Ok(ip)
}

/// Byte counters for one interface from `/proc/net/dev`.
pub fn read_counters(path: &Path, interface: &str) -> Result<Counters, TelemetryError> {
    let raw = read_file(path)?;
    for line in raw.lines() {
        let Some((name, fields)) = line.split_once(':') else {
            continue;
        };
        if name.trim() != interface {
            continue;
        }
        let fields: Vec<u64> = fields
            .split_whitespace()
            .map(|field| field.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| TelemetryError::parse(path, format!("bad counters for {}", interface)))?;
        // Receive block is 8 columns wide; transmit bytes come right after it.
        return match (fields.first(), fields.get(8)) {
            (Some(&rx_bytes), Some(&tx_bytes)) => Ok(Counters { rx_bytes, tx_bytes }),
            _ => Err(TelemetryError::parse(path, format!("short line for {}", interface))),
        };
    }
    Err(TelemetryError::InterfaceNotFound(interface.to_string()))
}
