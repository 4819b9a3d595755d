//! PTY transport for interactive shell sessions.
//!
//! The router modules talk to the device CLI by spawning its login shell
//! on a pseudo-terminal and exchanging plain lines of text. This module
//! owns that plumbing: spawning, line transmission, accumulating reads,
//! and guaranteed teardown of the child process.

use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use regex::Regex;
use tokio::sync::mpsc;

use crate::error::Error;

/// How the interactive shell gets spawned.
///
/// The terminal is made very wide by default so long status lines come
/// back unwrapped and stay matchable.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Program to run on the PTY.
    pub program: String,
    /// Arguments for the program.
    pub args: Vec<String>,
    /// Extra environment for the child.
    pub env: Vec<(String, String)>,
    /// Terminal width in columns.
    pub cols: u16,
    /// Terminal height in rows.
    pub rows: u16,
    /// Deadline for each read call. `None` blocks until the shell
    /// produces the awaited output or closes; callers that need a
    /// harder bound run their own watchdog.
    pub read_timeout: Option<Duration>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            env: vec![("TERM".to_string(), "xterm".to_string())],
            cols: 511,
            rows: 24,
            read_timeout: None,
        }
    }
}

/// Line-based exchange with an interactive shell.
///
/// The seam between the router session logic and the real PTY; tests
/// drive the session against a scripted implementation.
#[async_trait]
pub trait Transport: Send {
    /// Sends one line, discarding any output left over from earlier
    /// exchanges.
    async fn send_line(&mut self, line: &str) -> Result<(), Error>;

    /// Accumulates output until `pattern` matches, then returns
    /// everything read so far.
    async fn read_until(&mut self, pattern: &Regex) -> Result<String, Error>;

    /// Accumulates output until the shell closes its end of the stream.
    async fn read_to_eof(&mut self) -> Result<String, Error>;

    /// Terminates the shell process. Must be safe to call more than
    /// once and after the child already exited.
    async fn close(&mut self) -> Result<(), Error>;
}

/// A live shell child on a PTY.
///
/// A detached thread drains the PTY master into a channel; the async
/// read methods consume from that channel. Dropping the session kills
/// the child if `close` was never called.
pub struct ShellSession {
    child: Box<dyn Child + Send + Sync>,
    // Held so the PTY stays open for the child's lifetime.
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: String,
    eof: bool,
    read_timeout: Option<Duration>,
}

impl ShellSession {
    /// Spawns the configured program on a fresh PTY and disables local
    /// echo so transcripts carry device output rather than keystrokes.
    pub fn open(config: &ShellConfig) -> Result<Self, Error> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Spawn {
                reason: format!("failed to open PTY: {e}"),
            })?;

        let mut cmd = CommandBuilder::new(&config.program);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| Error::Spawn {
            reason: format!("failed to spawn {}: {e}", config.program),
        })?;
        // Drop the slave so reads observe EOF when the child exits.
        drop(pair.slave);

        #[cfg(unix)]
        disable_echo(pair.master.as_ref());

        let writer = pair.master.take_writer().map_err(|e| Error::Spawn {
            reason: format!("failed to take PTY writer: {e}"),
        })?;
        let mut reader = pair.master.try_clone_reader().map_err(|e| Error::Spawn {
            reason: format!("failed to clone PTY reader: {e}"),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            child,
            _master: pair.master,
            writer,
            output: rx,
            buffer: String::new(),
            eof: false,
            read_timeout: config.read_timeout,
        })
    }

    /// Process id of the shell child, when the platform reports one.
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    async fn fill_buffer(&mut self) {
        match self.output.recv().await {
            Some(chunk) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
            None => self.eof = true,
        }
    }

    async fn read_until_inner(&mut self, pattern: &Regex) -> Result<String, Error> {
        loop {
            if pattern.is_match(&self.buffer) {
                return Ok(std::mem::take(&mut self.buffer));
            }
            if self.eof {
                return Err(Error::SessionClosed);
            }
            self.fill_buffer().await;
        }
    }

    async fn read_to_eof_inner(&mut self) -> Result<String, Error> {
        while !self.eof {
            self.fill_buffer().await;
        }
        Ok(std::mem::take(&mut self.buffer))
    }
}

#[async_trait]
impl Transport for ShellSession {
    async fn send_line(&mut self, line: &str) -> Result<(), Error> {
        self.buffer.clear();
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    async fn read_until(&mut self, pattern: &Regex) -> Result<String, Error> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_until_inner(pattern))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.read_until_inner(pattern).await,
        }
    }

    async fn read_to_eof(&mut self) -> Result<String, Error> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_to_eof_inner())
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.read_to_eof_inner().await,
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        // Kill errors on an already-exited child are expected.
        let _ = self.child.kill();
        let _ = self.child.wait();
        Ok(())
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("pid", &self.child.process_id())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

/// Clears the ECHO flag on the PTY so sent lines do not come back in
/// the transcript.
#[cfg(unix)]
fn disable_echo(master: &dyn MasterPty) {
    let Some(fd) = master.as_raw_fd() else {
        return;
    };
    unsafe {
        let mut term: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut term) == 0 {
            term.c_lflag &= !libc::ECHO;
            let _ = libc::tcsetattr(fd, libc::TCSANOW, &term);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_config() -> ShellConfig {
        ShellConfig {
            program: "/bin/sh".to_string(),
            cols: 80,
            read_timeout: Some(Duration::from_secs(10)),
            ..ShellConfig::default()
        }
    }

    #[tokio::test]
    async fn reads_accumulate_until_eof() {
        let mut shell = ShellSession::open(&sh_config()).expect("spawn sh");
        shell.send_line("echo transport-check").await.unwrap();
        shell.send_line("exit").await.unwrap();

        let raw = shell.read_to_eof().await.unwrap();
        assert!(raw.contains("transport-check"), "raw output: {raw:?}");

        shell.close().await.unwrap();
    }

    #[tokio::test]
    async fn read_until_stops_at_the_pattern() {
        let mut shell = ShellSession::open(&sh_config()).expect("spawn sh");
        shell.send_line("echo marker-427").await.unwrap();

        let pattern = Regex::new("marker-427").unwrap();
        let raw = shell.read_until(&pattern).await.unwrap();
        assert!(raw.contains("marker-427"));

        shell.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut shell = ShellSession::open(&sh_config()).expect("spawn sh");
        shell.close().await.unwrap();
        shell.close().await.unwrap();
    }
}
