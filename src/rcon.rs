// Rcon - connectionless UDP queries against a running server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;

const PACKET_PREFIX: [u8; 4] = [0xff; 4];
const PRINT_HEADER: &str = "print\n";
const STATUS_HEADER: &str = "statusResponse\n";

/// Wait for the first reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
/// Wait for follow-up fragments once a reply started arriving.
const FRAGMENT_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum RconError {
    #[error("Rcon socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No reply from {0}")]
    Timeout(SocketAddr),

    #[error("Rcon is disabled for this server (no rcon password set)")]
    Disabled,

    #[error("Unexpected reply: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub score: i32,
    pub ping: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub cvars: HashMap<String, String>,
    pub players: Vec<Player>,
}

impl ServerInfo {
    pub fn cvar(&self, name: &str) -> Option<&str> {
        self.cvars.get(name).map(String::as_str)
    }
}

/// Players that hold a real connection. Bots report a ping of zero.
pub fn active_players(info: &ServerInfo) -> usize {
    info.players.iter().filter(|p| p.ping > 0).count()
}

pub fn encode_rcon(password: &str, command: &str) -> Vec<u8> {
    let mut packet = PACKET_PREFIX.to_vec();
    packet.extend_from_slice(format!("rcon {} {}", password, command).as_bytes());
    packet
}

pub fn encode_getstatus() -> Vec<u8> {
    let mut packet = PACKET_PREFIX.to_vec();
    packet.extend_from_slice(b"getstatus");
    packet
}

fn payload<'a>(packet: &'a [u8], header: &str) -> Option<std::borrow::Cow<'a, str>> {
    let body = packet.strip_prefix(&PACKET_PREFIX[..])?;
    let body = body.strip_prefix(header.as_bytes())?;
    Some(String::from_utf8_lossy(body))
}

/// Text of a `print` reply.
pub fn decode_print(packet: &[u8]) -> Option<String> {
    payload(packet, PRINT_HEADER).map(|s| s.into_owned())
}

/// Parse a `statusResponse`: one `\key\value` info line, then one
/// `score ping "name"` line per player.
pub fn decode_status(packet: &[u8]) -> Option<ServerInfo> {
    let body = payload(packet, STATUS_HEADER)?;
    let mut lines = body.lines();

    let mut cvars = HashMap::new();
    let info = lines.next().unwrap_or_default();
    let mut parts = info.trim_start_matches('\\').split('\\');
    while let (Some(k), Some(v)) = (parts.next(), parts.next()) {
        cvars.insert(k.to_string(), v.to_string());
    }

    let players = lines.filter_map(parse_player).collect();
    Some(ServerInfo { cvars, players })
}

fn parse_player(line: &str) -> Option<Player> {
    let mut fields = line.splitn(3, ' ');
    let score = fields.next()?.parse().ok()?;
    let ping = fields.next()?.parse().ok()?;
    let name = fields.next()?.trim().trim_matches('"');
    Some(Player {
        score,
        ping,
        name: strip_colors(name),
    })
}

/// Drop `^x` colour codes from a name.
pub fn strip_colors(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '^' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

pub struct RconClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RconClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: REPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a command and return the concatenated `print` replies.
    pub async fn command(&self, password: &str, command: &str) -> Result<String, RconError> {
        if password.is_empty() {
            return Err(RconError::Disabled);
        }
        tracing::debug!("rcon {} -> {}", self.addr, command);

        let packets = self.exchange(&encode_rcon(password, command)).await?;
        let mut text = String::new();
        for packet in &packets {
            match decode_print(packet) {
                Some(part) => text.push_str(&part),
                None => tracing::debug!("Ignoring non-print reply from {}", self.addr),
            }
        }
        Ok(text)
    }

    pub async fn status(&self) -> Result<ServerInfo, RconError> {
        let packets = self.exchange(&encode_getstatus()).await?;
        packets
            .iter()
            .find_map(|p| decode_status(p))
            .ok_or_else(|| {
                let first = packets.first().map(|p| String::from_utf8_lossy(p).into_owned());
                RconError::Malformed(first.unwrap_or_default())
            })
    }

    async fn exchange(&self, request: &[u8]) -> Result<Vec<Vec<u8>>, RconError> {
        let bind: SocketAddr = if self.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(self.addr).await?;
        socket.send(request).await?;

        let mut replies = Vec::new();
        let mut buf = vec![0u8; 16 * 1024];
        let mut wait = self.timeout;
        loop {
            match tokio::time::timeout(wait, socket.recv(&mut buf)).await {
                Ok(Ok(n)) => {
                    replies.push(buf[..n].to_vec());
                    wait = FRAGMENT_TIMEOUT;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        if replies.is_empty() {
            return Err(RconError::Timeout(self.addr));
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_packet(body: &str) -> Vec<u8> {
        let mut packet = PACKET_PREFIX.to_vec();
        packet.extend_from_slice(STATUS_HEADER.as_bytes());
        packet.extend_from_slice(body.as_bytes());
        packet
    }

    #[test]
    fn test_packet_encoding() {
        assert_eq!(encode_rcon("secret", "map goldrush"), b"\xff\xff\xff\xffrcon secret map goldrush".to_vec());
        assert_eq!(encode_getstatus(), b"\xff\xff\xff\xffgetstatus".to_vec());
    }

    #[test]
    fn test_decode_status() {
        let packet = status_packet(
            "\\sv_hostname\\^1ETL ^7Server\\mapname\\supply\\sv_maxclients\\24\n\
             12 48 \"^4Play^7er\"\n\
             0 0 \"[BOT]Dummy\"\n\
             3 999 \"Connecting\"\n",
        );
        let info = decode_status(&packet).unwrap();
        assert_eq!(info.cvar("mapname"), Some("supply"));
        assert_eq!(info.players.len(), 3);
        assert_eq!(info.players[0].name, "Player");
        assert_eq!(active_players(&info), 2);
    }

    #[test]
    fn test_empty_server() {
        let info = decode_status(&status_packet("\\mapname\\radar\n")).unwrap();
        assert_eq!(active_players(&info), 0);
    }

    #[test]
    fn test_decode_rejects_other_packets() {
        assert!(decode_status(b"print\nhello").is_none());
        assert!(decode_print(b"\xff\xff\xff\xffprint\nBad rconpassword.\n").is_some());
    }

    #[tokio::test]
    async fn test_command_roundtrip_over_udp() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], encode_rcon("pw", "status").as_slice());
            server.send_to(b"\xff\xff\xff\xffprint\nmap: radar\n", peer).await.unwrap();
            server.send_to(b"\xff\xff\xff\xffprint\nnum score ping\n", peer).await.unwrap();
        });

        let client = RconClient::new(addr).with_timeout(Duration::from_secs(2));
        let text = client.command("pw", "status").await.unwrap();
        responder.await.unwrap();
        assert_eq!(text, "map: radar\nnum score ping\n");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = RconClient::new(server.local_addr().unwrap()).with_timeout(Duration::from_millis(100));
        assert!(matches!(client.status().await, Err(RconError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_empty_password_is_refused() {
        let client = RconClient::new(([127, 0, 0, 1], 27960).into());
        assert!(matches!(client.command("", "status").await, Err(RconError::Disabled)));
    }
}
