//! Discord local-socket presence publisher.
//!
//! Speaks the Discord IPC framing directly: each frame is a little-endian
//! opcode and payload length followed by a JSON body. The connection
//! handshakes once, then presence updates go out as SET_ACTIVITY commands.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde_json::{json, Value};

use crate::presence::PresencePublisher;
use crate::protocol::PresenceDescriptor;

const DISCORD_CLIENT_ID: &str = "1335169826661990400";
const OPCODE_HANDSHAKE: u32 = 0;
const OPCODE_FRAME: u32 = 1;
const OPCODE_CLOSE: u32 = 2;
const SOCKET_IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Discord binds the first free slot in `discord-ipc-0..9`.
const MAX_SOCKET_SLOTS: u32 = 10;

pub struct DiscordIpcPublisher {
    socket: Option<UnixStream>,
    nonce: u64,
}

impl DiscordIpcPublisher {
    pub fn new() -> Self {
        Self {
            socket: None,
            nonce: 0,
        }
    }

    fn socket_base_dirs() -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for var in ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"] {
            if let Some(value) = std::env::var_os(var) {
                dirs.push(PathBuf::from(value));
            }
        }
        dirs.push(PathBuf::from("/tmp"));
        dirs
    }

    fn open_socket() -> Result<UnixStream, String> {
        for base in Self::socket_base_dirs() {
            for slot in 0..MAX_SOCKET_SLOTS {
                let path = base.join(format!("discord-ipc-{slot}"));
                if let Ok(stream) = UnixStream::connect(&path) {
                    debug!("Connected to Discord IPC socket {}", path.display());
                    return Ok(stream);
                }
            }
        }
        Err("no Discord IPC socket found; is the client running?".to_string())
    }

    fn write_frame(stream: &mut UnixStream, opcode: u32, payload: &Value) -> Result<(), String> {
        let body = payload.to_string();
        let mut frame = Vec::with_capacity(8 + body.len());
        frame.extend_from_slice(&opcode.to_le_bytes());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(body.as_bytes());
        stream
            .write_all(&frame)
            .map_err(|error| format!("failed to write IPC frame: {error}"))
    }

    fn read_frame(stream: &mut UnixStream) -> Result<(u32, Value), String> {
        let mut header = [0u8; 8];
        stream
            .read_exact(&mut header)
            .map_err(|error| format!("failed to read IPC frame header: {error}"))?;
        let opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let mut body = vec![0u8; length as usize];
        stream
            .read_exact(&mut body)
            .map_err(|error| format!("failed to read IPC frame body: {error}"))?;
        let payload = serde_json::from_slice(&body)
            .map_err(|error| format!("invalid IPC frame payload: {error}"))?;
        Ok((opcode, payload))
    }

    fn live_socket(&mut self) -> Result<&mut UnixStream, String> {
        self.socket
            .as_mut()
            .ok_or_else(|| "publisher is not connected".to_string())
    }

    fn send_command(&mut self, payload: Value) -> Result<(), String> {
        let stream = self.live_socket()?;
        Self::write_frame(stream, OPCODE_FRAME, &payload)?;
        let (opcode, response) = Self::read_frame(stream)?;
        if opcode == OPCODE_CLOSE {
            return Err(format!("IPC connection closed by peer: {response}"));
        }
        if response["evt"].as_str() == Some("ERROR") {
            return Err(format!(
                "SET_ACTIVITY rejected: {}",
                response["data"]["message"].as_str().unwrap_or("unknown")
            ));
        }
        Ok(())
    }

    fn next_nonce(&mut self) -> String {
        self.nonce += 1;
        self.nonce.to_string()
    }

    fn activity_payload(descriptor: &PresenceDescriptor) -> Value {
        let mut assets = json!({
            "large_image": descriptor.large_image,
            "large_text": descriptor.large_image_text,
        });
        if let (Some(small_image), Some(small_text)) =
            (&descriptor.small_image, &descriptor.small_image_text)
        {
            assets["small_image"] = json!(small_image);
            assets["small_text"] = json!(small_text);
        }

        let mut activity = json!({
            "type": 0,
            "details": descriptor.details,
            "state": descriptor.state,
            "timestamps": { "start": descriptor.start_timestamp_ms },
            "assets": assets,
        });
        if !descriptor.buttons.is_empty() {
            let buttons: Vec<Value> = descriptor
                .buttons
                .iter()
                .map(|button| json!({ "label": button.label, "url": button.url }))
                .collect();
            activity["buttons"] = Value::Array(buttons);
        }
        activity
    }

    fn set_activity_payload(&mut self, activity: Value) -> Value {
        json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            },
            "nonce": self.next_nonce(),
        })
    }
}

impl Default for DiscordIpcPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl PresencePublisher for DiscordIpcPublisher {
    fn connect(&mut self) -> Result<(), String> {
        let mut stream = Self::open_socket()?;
        stream
            .set_read_timeout(Some(SOCKET_IO_TIMEOUT))
            .map_err(|error| format!("failed to set socket timeout: {error}"))?;
        stream
            .set_write_timeout(Some(SOCKET_IO_TIMEOUT))
            .map_err(|error| format!("failed to set socket timeout: {error}"))?;

        let handshake = json!({ "v": 1, "client_id": DISCORD_CLIENT_ID });
        Self::write_frame(&mut stream, OPCODE_HANDSHAKE, &handshake)?;
        let (opcode, response) = Self::read_frame(&mut stream)?;
        if opcode == OPCODE_CLOSE {
            return Err(format!("handshake rejected: {response}"));
        }

        info!("Discord IPC handshake complete");
        self.socket = Some(stream);
        Ok(())
    }

    /// Drops the connection handle unconditionally; a failed shutdown cannot
    /// leave a stale half-open socket behind.
    fn close(&mut self) -> Result<(), String> {
        let Some(stream) = self.socket.take() else {
            return Ok(());
        };
        stream
            .shutdown(std::net::Shutdown::Both)
            .map_err(|error| format!("failed to shut down IPC socket: {error}"))
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn set_activity(&mut self, descriptor: &PresenceDescriptor) -> Result<(), String> {
        let activity = Self::activity_payload(descriptor);
        let payload = self.set_activity_payload(activity);
        self.send_command(payload)
    }

    fn clear_activity(&mut self) -> Result<(), String> {
        let payload = self.set_activity_payload(Value::Null);
        self.send_command(payload)
    }
}
