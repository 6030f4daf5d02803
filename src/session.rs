//! SSH connection and SFTP channel setup.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::{Agent, Session, Sftp};
use tracing::{debug, error, info};

use crate::config::TransferConfig;
use crate::error::TransferError;

/// One way of proving identity to the server, tried in list order.
pub enum AuthMethod<'a> {
    /// Keys held by a running ssh-agent
    Agent(Agent),
    Password(&'a str),
}

impl AuthMethod<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Agent(_) => "agent",
            AuthMethod::Password(_) => "password",
        }
    }
}

/// Probe the local ssh-agent (`SSH_AUTH_SOCK`). `None` means unavailable,
/// which is never an error.
pub fn detect_agent(session: &Session) -> Option<Agent> {
    let mut agent = match session.agent() {
        Ok(agent) => agent,
        Err(e) => {
            debug!(error = %e, "ssh-agent support unavailable");
            return None;
        }
    };
    if let Err(e) = agent.connect() {
        debug!(error = %e, "no ssh-agent reachable");
        return None;
    }
    if let Err(e) = agent.list_identities() {
        debug!(error = %e, "ssh-agent refused to list identities");
        let _ = agent.disconnect();
        return None;
    }
    Some(agent)
}

/// Agent first, then password. An empty password registers nothing.
pub fn auth_methods(agent: Option<Agent>, password: Option<&str>) -> Vec<AuthMethod<'_>> {
    let mut methods = Vec::with_capacity(2);
    if let Some(agent) = agent {
        methods.push(AuthMethod::Agent(agent));
    }
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        methods.push(AuthMethod::Password(password));
    }
    methods
}

/// Walk `methods` in order and stop at the first that the server accepts.
/// Returns the name of the winning method.
pub fn authenticate(
    session: &Session,
    user: &str,
    addr: &str,
    methods: Vec<AuthMethod<'_>>,
) -> Result<&'static str, TransferError> {
    let mut tried = Vec::with_capacity(methods.len());

    for method in methods {
        let name = method.name();
        tried.push(name);
        if try_method(session, user, method) {
            return Ok(name);
        }
        debug!(method = name, "auth method exhausted");
    }

    let tried = if tried.is_empty() {
        "none".to_string()
    } else {
        tried.join(", ")
    };
    error!(user, addr, tried = %tried, "authentication rejected");
    Err(TransferError::AuthRejected {
        user: user.to_string(),
        addr: addr.to_string(),
        tried,
    })
}

fn try_method(session: &Session, user: &str, method: AuthMethod<'_>) -> bool {
    match method {
        AuthMethod::Agent(mut agent) => {
            let identities = match agent.identities() {
                Ok(identities) => identities,
                Err(e) => {
                    debug!(error = %e, "unable to read agent identities");
                    return false;
                }
            };
            let accepted = identities.iter().any(|identity| {
                match agent.userauth(user, identity) {
                    Ok(()) => session.authenticated(),
                    Err(e) => {
                        debug!(key = identity.comment(), error = %e, "agent key rejected");
                        false
                    }
                }
            });
            let _ = agent.disconnect();
            accepted
        }
        AuthMethod::Password(password) => match session.userauth_password(user, password) {
            Ok(()) => session.authenticated(),
            Err(e) => {
                debug!(error = %e, "password rejected");
                false
            }
        },
    }
}

/// Resolve `addr` and connect to the first address that answers.
pub fn open_tcp(addr: &str, timeout: Option<Duration>) -> Result<TcpStream, TransferError> {
    let candidates: Vec<_> = addr
        .to_socket_addrs()
        .map_err(|source| TransferError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses found");
    if candidates.is_empty() {
        return Err(TransferError::Resolve {
            addr: addr.to_string(),
            source: last_err,
        });
    }

    for candidate in candidates {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%candidate, error = %e, "connect attempt failed");
                last_err = e;
            }
        }
    }
    Err(TransferError::Connect {
        addr: addr.to_string(),
        source: last_err,
    })
}

/// Disconnects the wrapped session when dropped.
struct SessionGuard {
    session: Session,
    addr: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "backup finished", None) {
            debug!(addr = %self.addr, error = %e, "disconnect failed");
        }
        debug!(addr = %self.addr, "connection closed");
    }
}

/// An authenticated session with its SFTP channel.
///
/// Dropping it closes the channel and then disconnects the session.
pub struct Connection {
    // Field order is drop order: the channel goes before the session.
    sftp: Sftp,
    _session: SessionGuard,
}

impl Connection {
    pub fn connect(config: &TransferConfig) -> Result<Self, TransferError> {
        let addr = config.address();
        info!(addr = %addr, "connecting");

        let tcp = open_tcp(&addr, config.connect_timeout)
            .inspect_err(|e| error!(addr = %addr, error = %e, "unable to connect"))?;

        let handshake_err = |source: ssh2::Error| {
            error!(addr = %addr, error = %source, "SSH handshake failed");
            TransferError::Handshake {
                addr: addr.clone(),
                source,
            }
        };
        let mut session = Session::new().map_err(handshake_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(handshake_err)?;
        let session = SessionGuard {
            session,
            addr: addr.clone(),
        };

        let methods = auth_methods(detect_agent(&session.session), config.password.as_deref());
        let method = authenticate(&session.session, &config.username, &addr, methods)?;
        info!(user = %config.username, method, "authenticated");

        let sftp = session.session.sftp().map_err(|source| {
            error!(addr = %addr, error = %source, "unable to start sftp subsystem");
            TransferError::Sftp { source }
        })?;

        Ok(Self {
            sftp,
            _session: session,
        })
    }

    pub fn sftp(&self) -> &Sftp {
        &self.sftp
    }
}
