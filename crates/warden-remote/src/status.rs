//! Minimal server list ping: handshake, status request, JSON response.
//! Enough to tell whether the game server is up; the payload also carries
//! player counts for callers that want them.

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const STATUS_PROTOCOL_STATE: i32 = 1;
const MAX_STATUS_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StatusPing {
    #[serde(default)]
    pub version: Option<VersionInfo>,
    #[serde(default)]
    pub players: Option<PlayerCounts>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct VersionInfo {
    pub name: String,
    #[serde(default)]
    pub protocol: i64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PlayerCounts {
    pub online: u32,
    pub max: u32,
}

/// Query the server at `address` (`host` or `host:port`, default port 25565).
pub async fn query(address: &str, timeout: Duration) -> anyhow::Result<StatusPing> {
    let (host, port) = split_address(address);
    tokio::time::timeout(timeout, async {
        let mut stream = TcpStream::connect((host, port))
            .await
            .context("connect to game server")?;
        exchange(&mut stream, host, port).await
    })
    .await
    .context("status query timed out")?
}

/// The wire exchange, separated from the socket so tests can drive it over an
/// in-memory stream.
pub(crate) async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    host: &str,
    port: u16,
) -> anyhow::Result<StatusPing> {
    let mut handshake = Vec::new();
    write_varint(&mut handshake, 0x00);
    write_varint(&mut handshake, -1); // protocol version is irrelevant for status
    write_string(&mut handshake, host);
    handshake.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut handshake, STATUS_PROTOCOL_STATE);
    write_frame(stream, &handshake).await?;

    write_frame(stream, &[0x00]).await?;

    let frame = read_frame(stream).await?;
    let mut cursor = frame.as_slice();
    let packet_id = read_varint(&mut cursor)?;
    if packet_id != 0x00 {
        anyhow::bail!("unexpected status packet id: {packet_id}");
    }
    let json_len = read_varint(&mut cursor)? as usize;
    if json_len > cursor.len() {
        anyhow::bail!("status payload length exceeds frame");
    }
    serde_json::from_slice(&cursor[..json_len]).context("malformed status payload")
}

fn split_address(address: &str) -> (&str, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(p) => (host, p),
            Err(_) => (address, 25565),
        },
        None => (address, 25565),
    }
}

pub(crate) fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

pub(crate) fn read_varint(cursor: &mut &[u8]) -> anyhow::Result<i32> {
    let mut out: u32 = 0;
    for i in 0..5 {
        let Some((&byte, rest)) = cursor.split_first() else {
            anyhow::bail!("truncated varint");
        };
        *cursor = rest;
        out |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(out as i32);
        }
    }
    anyhow::bail!("varint longer than 5 bytes")
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) -> anyhow::Result<()> {
    let mut frame = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut frame, payload.len() as i32);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await.context("write status frame")?;
    stream.flush().await.context("flush status frame")?;
    Ok(())
}

async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> anyhow::Result<Vec<u8>> {
    let len = read_varint_async(stream).await? as usize;
    if len == 0 || len > MAX_STATUS_FRAME_BYTES {
        anyhow::bail!("unreasonable status frame length: {len}");
    }
    let mut frame = vec![0u8; len];
    stream
        .read_exact(&mut frame)
        .await
        .context("read status frame")?;
    Ok(frame)
}

async fn read_varint_async<S: AsyncRead + Unpin>(stream: &mut S) -> anyhow::Result<i32> {
    let mut out: u32 = 0;
    for i in 0..5 {
        let byte = stream.read_u8().await.context("read status frame length")?;
        out |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(out as i32);
        }
    }
    anyhow::bail!("varint longer than 5 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn roundtrip(value: i32) -> i32 {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        let mut cursor = buf.as_slice();
        let out = read_varint(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        out
    }

    #[test]
    fn varint_roundtrips() {
        for v in [0, 1, 127, 128, 255, 25565, i32::MAX, -1, i32::MIN] {
            assert_eq!(roundtrip(v), v);
        }
    }

    #[test]
    fn varint_known_encodings() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 25565);
        assert_eq!(buf, vec![0xDD, 0xC7, 0x01]);

        buf.clear();
        write_varint(&mut buf, -1);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn read_varint_rejects_truncated_input() {
        let mut cursor: &[u8] = &[0x80, 0x80];
        assert!(read_varint(&mut cursor).is_err());
    }

    #[test]
    fn split_address_defaults_port() {
        assert_eq!(split_address("mc.example.net"), ("mc.example.net", 25565));
        assert_eq!(split_address("mc.example.net:1234"), ("mc.example.net", 1234));
        assert_eq!(split_address("weird:name"), ("weird:name", 25565));
    }

    #[tokio::test]
    async fn exchange_decodes_a_status_response() {
        let (mut client, mut server) = duplex(4096);

        let server_task = tokio::spawn(async move {
            // Drain the handshake and request frames.
            let mut scratch = [0u8; 1024];
            let _ = server.read(&mut scratch).await.unwrap();

            let json = br#"{"version":{"name":"1.21.1","protocol":767},"players":{"online":3,"max":20}}"#;
            let mut payload = Vec::new();
            write_varint(&mut payload, 0x00);
            write_varint(&mut payload, json.len() as i32);
            payload.extend_from_slice(json);

            let mut frame = Vec::new();
            write_varint(&mut frame, payload.len() as i32);
            frame.extend_from_slice(&payload);
            server.write_all(&frame).await.unwrap();
        });

        let ping = exchange(&mut client, "mc.example.net", 25565).await.unwrap();
        server_task.await.unwrap();

        assert_eq!(ping.version.unwrap().name, "1.21.1");
        let players = ping.players.unwrap();
        assert_eq!(players.online, 3);
        assert_eq!(players.max, 20);
    }
}
