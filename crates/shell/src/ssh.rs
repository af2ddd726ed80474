//! Runs commands over an SSH session.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fleet::{
    CommandOutput, CommandRequest, ConnectionInfo, RunningCommand, TargetPath, Transport,
    TransportError,
};
use ssh2::Session;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{make_dir_command, remote_command_line};

/// Transport backed by a single `ssh2` session.
///
/// libssh2 calls are moved onto tokio's blocking pool. The session is opened
/// by [`Transport::connect`] and shared by every command spawned afterwards;
/// once logged in it is non-blocking, so channels on it never wait on each
/// other.
pub struct SshTransport {
    info: ConnectionInfo,
    timeout: Duration,
    session: Arc<Mutex<Option<Session>>>,
}

impl SshTransport {
    pub fn new(info: ConnectionInfo, timeout: Duration) -> Self {
        Self {
            info,
            timeout,
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn slot(&self) -> Result<MutexGuard<'_, Option<Session>>, TransportError> {
        self.session.lock().map_err(|_| TransportError::Session {
            message: "session lock poisoned".to_string(),
        })
    }

    fn current(&self) -> Result<Session, TransportError> {
        self.slot()?.clone().ok_or(TransportError::NotConnected)
    }
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("info", &self.info)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.slot()?.is_some() {
            return Ok(());
        }
        let info = self.info.clone();
        let timeout = self.timeout;
        let session = tokio::task::spawn_blocking(move || open_session(&info, timeout))
            .await
            .map_err(join_error)??;
        *self.slot()? = Some(session);
        Ok(())
    }

    async fn spawn(
        &self,
        request: &CommandRequest,
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        let session = self.current()?;
        let command_line = remote_command_line(request);
        debug!(endpoint = %self.info.endpoint(), command = %command_line, "ssh exec");
        let handle = tokio::task::spawn_blocking(move || run_channel(&session, &command_line));
        Ok(Box::new(SshProcess { handle }))
    }

    async fn make_dir(
        &self,
        path: &TargetPath,
        parents: bool,
        exist_ok: bool,
    ) -> Result<(), TransportError> {
        let session = self.current()?;
        let command_line = make_dir_command(path, parents, exist_ok);
        let output = tokio::task::spawn_blocking(move || run_channel(&session, &command_line))
            .await
            .map_err(join_error)??;
        if output.exit_code == Some(0) {
            Ok(())
        } else {
            Err(TransportError::Session {
                message: format!("cannot create {path}: {}", output.stderr.trim()),
            })
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(session) = self.slot()?.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || retry(|| session.disconnect(None, "closing", None)))
            .await
            .map_err(join_error)?
            .map_err(session_error)
    }
}

struct SshProcess {
    handle: JoinHandle<Result<CommandOutput, TransportError>>,
}

#[async_trait]
impl RunningCommand for SshProcess {
    async fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        self.handle.await.map_err(join_error)?
    }
}

fn open_session(info: &ConnectionInfo, timeout: Duration) -> Result<Session, TransportError> {
    let endpoint = info.endpoint();
    let connect_error = |message: String| TransportError::Connect {
        endpoint: endpoint.clone(),
        message,
    };

    let addr = endpoint
        .to_socket_addrs()
        .map_err(|e| connect_error(format!("cannot resolve: {e}")))?
        .next()
        .ok_or_else(|| connect_error("no addresses found".to_string()))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| connect_error(e.to_string()))?;

    let mut session = Session::new().map_err(|e| connect_error(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| connect_error(format!("handshake failed: {e}")))?;

    authenticate(&session, info)?;

    // The timeout only bounds the handshake and login. Commands may stay
    // silent for as long as they like, and both output streams are polled.
    session.set_timeout(0);
    session.set_blocking(false);
    debug!(%endpoint, username = %info.username, "ssh session established");
    Ok(session)
}

/// Tries the private key, then the password, then the agent.
fn authenticate(session: &Session, info: &ConnectionInfo) -> Result<(), TransportError> {
    let username = info.username.as_str();

    if !info.private_key_file.is_empty() {
        let key = expand_home(&info.private_key_file);
        if let Err(e) = session.userauth_pubkey_file(username, None, &key, None) {
            warn!(key = %key.display(), error = %e, "public key authentication failed");
        }
    }
    if !session.authenticated() && !info.password.is_empty() {
        if let Err(e) = session.userauth_password(username, &info.password) {
            warn!(error = %e, "password authentication failed");
        }
    }
    if !session.authenticated() {
        if let Err(e) = session.userauth_agent(username) {
            debug!(error = %e, "agent authentication failed");
        }
    }

    if session.authenticated() {
        Ok(())
    } else {
        Err(TransportError::Authentication {
            username: username.to_string(),
            endpoint: info.endpoint(),
            message: "no configured method was accepted".to_string(),
        })
    }
}

fn run_channel(session: &Session, command_line: &str) -> Result<CommandOutput, TransportError> {
    let mut channel = retry(|| session.channel_session()).map_err(session_error)?;
    retry(|| channel.exec(command_line)).map_err(session_error)?;

    let (stdout, stderr) = drain(&mut channel.stream(0), &mut channel.stderr(), || channel.eof())?;

    retry(|| channel.wait_close()).map_err(session_error)?;
    let exit_code = channel.exit_status().map_err(session_error)?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: Some(exit_code),
    })
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const LIBSSH2_ERROR_EAGAIN: i32 = -37;

/// Repeats a libssh2 call on a non-blocking session until it stops asking
/// to be retried.
fn retry<T>(mut call: impl FnMut() -> Result<T, ssh2::Error>) -> Result<T, ssh2::Error> {
    loop {
        match call() {
            Err(e) if matches!(e.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_EAGAIN)) => {
                std::thread::sleep(POLL_INTERVAL)
            }
            outcome => return outcome,
        }
    }
}

/// Reads both streams of a channel in turn until the remote end has sent
/// EOF and neither has data left. Reading them alternately keeps a chatty
/// stderr from filling the channel window while stdout waits.
fn drain(
    stdout: &mut impl Read,
    stderr: &mut impl Read,
    eof: impl Fn() -> bool,
) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let finished = eof();
        let mut progressed = false;
        let streams: [(&mut dyn Read, &mut Vec<u8>); 2] =
            [(&mut *stdout, &mut out), (&mut *stderr, &mut err)];
        for (stream, sink) in streams {
            match stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    sink.extend_from_slice(&buf[..n]);
                    progressed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => progressed = true,
                Err(e) => return Err(e),
            }
        }
        if progressed {
            continue;
        }
        if finished {
            return Ok((out, err));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn session_error(e: ssh2::Error) -> TransportError {
    TransportError::Session { message: e.to_string() }
}

fn join_error(e: tokio::task::JoinError) -> TransportError {
    TransportError::Session {
        message: format!("blocking task failed: {e}"),
    }
}
