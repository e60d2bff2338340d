use anyhow::Result;

use crate::models::{DataFormat, ResolvedHost};
use crate::netconf::{rpc, NetconfClient, SshTransport, Transport};

/// Candidate-configuration lifecycle on one device.
/// Push is `lock` + `load`, then `diff`, then `commit` or `rollback`.
pub trait ConfigSession {
    fn lock(&mut self) -> Result<()>;

    /// Load configuration into the candidate
    fn load(&mut self, config: &str, format: DataFormat) -> Result<()>;

    /// Pending candidate changes, or None when there are none
    fn diff(&mut self) -> Result<Option<String>>;

    fn commit(&mut self, comment: Option<&str>) -> Result<()>;

    /// Throw away uncommitted candidate changes
    fn rollback(&mut self) -> Result<()>;

    /// Release the lock (if held) and end the session
    fn close(&mut self);
}

/// Opens a ConfigSession for a host
pub trait Connector: Send + Sync {
    fn connect(&self, host: &ResolvedHost) -> Result<Box<dyn ConfigSession>>;
}

/// Connects to Junos devices over NETCONF
#[derive(Debug, Clone, Copy, Default)]
pub struct NetconfConnector;

impl Connector for NetconfConnector {
    fn connect(&self, host: &ResolvedHost) -> Result<Box<dyn ConfigSession>> {
        if host.platform != crate::models::platform::JUNOS {
            tracing::warn!(
                "{}: platform is '{}', continuing with Junos NETCONF",
                host.name,
                host.platform
            );
        }
        Ok(Box::new(JunosSession::<SshTransport>::open(host)?))
    }
}

/// ConfigSession backed by a NETCONF client
pub struct JunosSession<T: Transport = SshTransport> {
    client: NetconfClient<T>,
    locked: bool,
}

impl JunosSession<SshTransport> {
    pub fn open(host: &ResolvedHost) -> Result<Self> {
        Ok(Self::new(NetconfClient::<SshTransport>::connect(host)?))
    }
}

impl<T: Transport> JunosSession<T> {
    pub fn new(client: NetconfClient<T>) -> Self {
        Self {
            client,
            locked: false,
        }
    }
}

impl<T: Transport> ConfigSession for JunosSession<T> {
    fn lock(&mut self) -> Result<()> {
        self.client.rpc(&rpc::lock_candidate())?;
        self.locked = true;
        Ok(())
    }

    fn load(&mut self, config: &str, format: DataFormat) -> Result<()> {
        self.client.rpc(&rpc::load_configuration(format, config))?;
        Ok(())
    }

    fn diff(&mut self) -> Result<Option<String>> {
        let reply = self.client.rpc(&rpc::compare_rollback())?;
        Ok(reply.configuration_output())
    }

    fn commit(&mut self, comment: Option<&str>) -> Result<()> {
        self.client.rpc(&rpc::commit(comment))?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.client.rpc(&rpc::discard_changes())?;
        Ok(())
    }

    fn close(&mut self) {
        if self.locked {
            match self.client.rpc(&rpc::unlock_candidate()) {
                Ok(_) => self.locked = false,
                Err(e) => tracing::warn!("Failed to unlock candidate: {}", e),
            }
        }
        self.client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netconf::testing::{ScriptedStream, HELLO, OK};

    const LOCKED: &str = "<rpc-reply><rpc-error><error-severity>error</error-severity><error-message>configuration database locked by: admin</error-message></rpc-error></rpc-reply>";

    fn session(replies: &[&str]) -> JunosSession<ScriptedStream> {
        let mut script = vec![HELLO];
        script.extend_from_slice(replies);
        let client = NetconfClient::handshake("srx1", ScriptedStream::new(&script, 4096)).unwrap();
        JunosSession::new(client)
    }

    fn sent(session: &JunosSession<ScriptedStream>) -> String {
        session.client.transport().written_str()
    }

    #[test]
    fn test_close_unlocks_after_lock() {
        // lock, unlock, close-session
        let mut s = session(&[OK, OK, OK]);
        s.lock().unwrap();
        s.close();

        let out = sent(&s);
        let lock = out.find("<lock>").unwrap();
        let unlock = out.find("<unlock>").unwrap();
        let close = out.find("<close-session/>").unwrap();
        assert!(lock < unlock && unlock < close);
        assert!(!s.locked);
    }

    #[test]
    fn test_close_without_lock_skips_unlock() {
        let mut s = session(&[OK]);
        s.close();
        assert!(!sent(&s).contains("<unlock>"));
        assert!(sent(&s).contains("<close-session/>"));
    }

    #[test]
    fn test_failed_lock_is_not_unlocked() {
        let mut s = session(&[LOCKED, OK]);
        assert!(s.lock().is_err());
        s.close();
        assert!(!sent(&s).contains("<unlock>"));
    }

    #[test]
    fn test_diff_reads_configuration_output() {
        let reply = "<rpc-reply><configuration-information><configuration-output>\n[edit]\n+ x;\n</configuration-output></configuration-information></rpc-reply>";
        let mut s = session(&[OK, reply]);
        s.load("set security address-book global address a 192.0.2.1/32", DataFormat::Set)
            .unwrap();
        assert_eq!(s.diff().unwrap().as_deref(), Some("[edit]\n+ x;"));
        let out = sent(&s);
        assert!(out.contains(r#"message-id="1"><load-configuration action="set""#));
        assert!(out.contains(r#"message-id="2"><get-configuration compare="rollback""#));
    }
}
