use async_trait::async_trait;
use sm_common::{EnvConfig, ManagerError, Result};
use tokio::net::UdpSocket;
use tracing::info;

pub type MacAddress = [u8; 6];

/// Parse a hardware address written with `:`/`-` separators or none.
pub fn parse_mac(mac: &str) -> Result<MacAddress> {
    let hex: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ManagerError::ServerConfiguration(format!(
            "invalid MAC address '{}'",
            mac
        )));
    }

    let mut out = [0u8; 6];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
            ManagerError::ServerConfiguration(format!("invalid MAC address '{}'", mac))
        })?;
    }
    Ok(out)
}

/// 6 x 0xFF followed by 16 repetitions of the address.
pub fn magic_packet(mac: MacAddress) -> [u8; 102] {
    let mut pkt = [0xFFu8; 102];
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    pkt
}

/// Hardware power-on through a listening network interface.
#[async_trait]
pub trait WakeSignal: Send + Sync {
    /// Fire-and-forget: no reply is expected or read.
    async fn wake(&self, mac: MacAddress) -> Result<()>;
}

/// Sends the magic packet as one UDP broadcast datagram.
#[derive(Debug, Clone)]
pub struct UdpWake {
    destination: String,
}

impl UdpWake {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(config.wol_broadcast.clone())
    }
}

impl Default for UdpWake {
    fn default() -> Self {
        Self::new("255.255.255.255:9")
    }
}

#[async_trait]
impl WakeSignal for UdpWake {
    async fn wake(&self, mac: MacAddress) -> Result<()> {
        let packet = magic_packet(mac);
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        socket.send_to(&packet, self.destination.as_str()).await?;
        info!(destination = %self.destination, mac = %format_mac(mac), "Wake signal sent");
        Ok(())
    }
}

pub fn format_mac(mac: MacAddress) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
