use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Resolve host:port to the first socket address
fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("Invalid address {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| format!("No address found for {}:{}", host, port))
}

/// Create an SSH session and authenticate.
/// With a password: password auth, then keyboard-interactive (Junos often requires it).
/// Without one: keys from the running ssh-agent.
/// This is blocking, so call from a spawn_blocking context.
pub fn ssh_connect(
    host: &str,
    port: u16,
    user: &str,
    pass: Option<&str>,
    timeout_secs: u64,
) -> Result<ssh2::Session, String> {
    let addr = resolve_addr(host, port)?;
    let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(timeout_secs))
        .map_err(|e| format!("TCP connection to {} failed: {}", addr, e))?;

    tcp.set_read_timeout(Some(Duration::from_secs(timeout_secs)))
        .ok();
    tcp.set_write_timeout(Some(Duration::from_secs(timeout_secs)))
        .ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| format!("Failed to create SSH session: {}", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout((timeout_secs * 1000).min(u32::MAX as u64) as u32);
    session.handshake()
        .map_err(|e| format!("SSH handshake failed: {}", e))?;

    match pass {
        Some(pass) => {
            match session.userauth_password(user, pass) {
                Ok(_) if session.authenticated() => return Ok(session),
                _ => {}
            }

            let mut prompter = PasswordPrompt { password: pass.to_string() };
            let _ = session.userauth_keyboard_interactive(user, &mut prompter);
        }
        None => {
            if let Err(e) = session.userauth_agent(user) {
                tracing::debug!("ssh-agent auth for {}@{} failed: {}", user, host, e);
            }
        }
    }

    if session.authenticated() {
        Ok(session)
    } else {
        Err("SSH authentication failed: all methods exhausted".to_string())
    }
}

/// Truncate output to a maximum number of lines
pub fn truncate_lines(s: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= max_lines {
        s.to_string()
    } else {
        let truncated: Vec<&str> = lines[..max_lines].to_vec();
        format!("{}\n... ({} more lines)", truncated.join("\n"), lines.len() - max_lines)
    }
}
