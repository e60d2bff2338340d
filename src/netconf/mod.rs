pub mod rpc;

use anyhow::{Context, Result};
use std::io::{Read, Write};

use crate::models::ResolvedHost;
use rpc::RpcReply;

/// Largest reply accepted before the session is considered broken
const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Byte stream a NETCONF session runs over
pub trait Transport: Read + Write {
    /// Signal end of input and wait for the peer to close
    fn shutdown(&mut self) {}
}

/// The "netconf" subsystem channel of an SSH session
pub struct SshTransport {
    // Kept alive for the channel's lifetime
    _session: ssh2::Session,
    channel: ssh2::Channel,
}

impl Read for SshTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.read(buf)
    }
}

impl Write for SshTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.channel.flush()
    }
}

impl Transport for SshTransport {
    fn shutdown(&mut self) {
        let _ = self.channel.send_eof();
        let _ = self.channel.wait_close();
    }
}

/// NetconfClient speaks NETCONF 1.0 over a Transport.
/// All calls block, so run it from a spawn_blocking context.
pub struct NetconfClient<T: Transport = SshTransport> {
    host: String,
    transport: T,
    buffer: Vec<u8>,
    message_id: u64,
    session_id: Option<u64>,
    max_message_bytes: usize,
}

impl NetconfClient<SshTransport> {
    /// Connect over SSH, open the netconf subsystem and exchange hellos
    pub fn connect(host: &ResolvedHost) -> Result<Self> {
        let user = host
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No username configured for {}", host.name))?;

        tracing::debug!(
            "Opening NETCONF session to {}:{} as {}",
            host.hostname,
            host.port,
            user
        );

        let session = crate::utils::ssh_connect(
            &host.hostname,
            host.port,
            user,
            host.password.as_deref(),
            host.timeout,
        )
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to connect to {}", host.name))?;

        let mut channel = session
            .channel_session()
            .map_err(|e| anyhow::anyhow!("Failed to open channel: {}", e))?;
        channel
            .subsystem("netconf")
            .map_err(|e| anyhow::anyhow!("Failed to start netconf subsystem: {}", e))?;

        let transport = SshTransport {
            _session: session,
            channel,
        };
        Self::handshake(&host.name, transport)
    }
}

impl<T: Transport> NetconfClient<T> {
    /// Read the server hello and answer with ours
    pub fn handshake(host: &str, transport: T) -> Result<Self> {
        let mut client = Self {
            host: host.to_string(),
            transport,
            buffer: Vec::new(),
            message_id: 0,
            session_id: None,
            max_message_bytes: MAX_MESSAGE_BYTES,
        };

        let server_hello = client.read_message()?;
        let hello = rpc::parse_hello(&server_hello);
        if !hello.capabilities.iter().any(|c| c == rpc::BASE_1_0) {
            tracing::warn!("{}: server did not advertise {}", client.host, rpc::BASE_1_0);
        }
        client.session_id = hello.session_id;
        client.send(&rpc::client_hello())?;

        tracing::debug!(
            "NETCONF session {} established with {}",
            client.session_id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
            client.host
        );
        Ok(client)
    }

    /// Send one RPC and wait for its reply. Replies carrying an
    /// error-severity <rpc-error> become errors.
    pub fn rpc(&mut self, operation: &str) -> Result<RpcReply> {
        self.message_id += 1;
        let message = rpc::wrap_rpc(self.message_id, operation);
        tracing::trace!("{} >> {}", self.host, message);
        self.send(&message)?;

        let raw = self.read_message()?;
        tracing::trace!("{} << {}", self.host, raw);
        let reply = RpcReply::new(raw).check()?;
        Ok(reply)
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Politely end the session; errors are only logged
    pub fn close(&mut self) {
        if let Err(e) = self.rpc(&rpc::close_session()) {
            tracing::debug!("{}: close-session failed: {}", self.host, e);
        }
        self.transport.shutdown();
    }

    fn send(&mut self, message: &str) -> Result<()> {
        let mut framed = Vec::with_capacity(message.len() + rpc::DELIMITER.len());
        framed.extend_from_slice(message.as_bytes());
        framed.extend_from_slice(rpc::DELIMITER);

        self.transport
            .write_all(&framed)
            .with_context(|| format!("Failed to write to {}", self.host))?;
        self.transport
            .flush()
            .with_context(|| format!("Failed to flush to {}", self.host))
    }

    fn read_message(&mut self) -> Result<String> {
        let mut chunk = [0u8; 16 * 1024];
        loop {
            if let Some(message) = rpc::extract_message(&mut self.buffer) {
                return Ok(message);
            }
            if self.buffer.len() > self.max_message_bytes {
                return Err(anyhow::anyhow!(
                    "{}: reply exceeds {} bytes",
                    self.host,
                    self.max_message_bytes
                ));
            }

            let n = self
                .transport
                .read(&mut chunk)
                .with_context(|| format!("Failed to read from {}", self.host))?;
            if n == 0 {
                return Err(anyhow::anyhow!("{}: session closed by device", self.host));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Transport;
    use std::io::{Read, Write};

    /// In-memory device: replays `input` at most `chunk` bytes per read
    /// and records everything written to it.
    pub struct ScriptedStream {
        input: Vec<u8>,
        pos: usize,
        chunk: usize,
        pub written: Vec<u8>,
        pub shut_down: bool,
    }

    impl ScriptedStream {
        pub fn new(messages: &[&str], chunk: usize) -> Self {
            let mut input = Vec::new();
            for m in messages {
                input.extend_from_slice(m.as_bytes());
                input.extend_from_slice(super::rpc::DELIMITER);
            }
            Self::raw(input, chunk)
        }

        pub fn raw(input: Vec<u8>, chunk: usize) -> Self {
            Self {
                input,
                pos: 0,
                chunk: chunk.max(1),
                written: Vec::new(),
                shut_down: false,
            }
        }

        pub fn written_str(&self) -> String {
            String::from_utf8_lossy(&self.written).to_string()
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for ScriptedStream {
        fn shutdown(&mut self) {
            self.shut_down = true;
        }
    }

    pub const HELLO: &str = r#"<hello xmlns="urn:ietf:params:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities><session-id>4021</session-id></hello>"#;
    pub const OK: &str = "<rpc-reply><ok/></rpc-reply>";
}
