//! VyOS router sessions and the agent-facing command entry points.
//!
//! Two usage shapes are supported, matching how a configuration agent
//! calls into the device:
//!
//! * One-shot dispatch: [`run_op_mode_command`] and
//!   [`run_config_mode_command`] open a fresh session, run exactly one
//!   logical operation, and always close the session afterwards.
//! * Held-open sessions: a [`Router`] stays open across a sequence of
//!   `configure` / `set` / `delete` / `commit` / `save` / `exit` calls,
//!   tracking mode and pending-change flags as it goes.

mod output;

pub use output::normalize;

use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::Error;
use crate::shell::{ShellConfig, ShellSession, Transport};

// Failure phrases the device prints instead of a useful exit status.
static SET_FAILED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Set\s+failed").expect("hardcoded pattern"));
static ALREADY_EXISTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"already exists").expect("hardcoded pattern"));
static NOTHING_TO_DELETE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Nothing\s+to\s+delete").expect("hardcoded pattern"));
static COMMIT_FAILED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Commit\s+failed").expect("hardcoded pattern"));
static COMMIT_IN_PROGRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"another\s+commit\s+in\s+progress").expect("hardcoded pattern"));

/// First tokens accepted by [`run_config_mode_command`].
pub const CONFIG_MODE_COMMANDS: &[&str] = &[
    "confirm", "comment", "compare", "copy", "delete", "discard", "edit", "load", "loadkey",
    "merge", "rename", "rollback", "run", "set", "show",
];

/// Session configuration for one device.
///
/// Everything the session needs to know about the device lives here
/// rather than in process-wide state: where the CLI is installed, which
/// login user owns the shell, and what its prompts look like.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Root of the CLI installation on the device.
    pub install_dir: PathBuf,
    /// Login user whose shell is the device CLI.
    pub login_user: String,
    /// Lines sent right after the shell comes up.
    pub setup_commands: Vec<String>,
    /// Regex for the operational mode prompt.
    pub op_prompt_pattern: String,
    /// Regex for the configuration mode prompt.
    pub config_prompt_pattern: String,
    /// Terminal width; wide enough that status lines never wrap.
    pub term_width: u16,
    /// Optional deadline applied to each read on the session.
    pub read_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/opt/vyatta"),
            login_user: "vyos".to_string(),
            setup_commands: vec![
                "export TERM=xterm".to_string(),
                "set terminal length 0".to_string(),
            ],
            op_prompt_pattern: r"(?m)[\w\-.]+@[\w\-.]+:[^\r\n]*\$ ?$".to_string(),
            config_prompt_pattern: r"(?m)[\w\-.]+@[\w\-.]+# ?$".to_string(),
            term_width: 511,
            read_timeout: None,
        }
    }
}

impl RouterConfig {
    pub fn with_login_user(mut self, user: impl Into<String>) -> Self {
        self.login_user = user.into();
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Path of the CLI shell API binary under the install root.
    pub fn shell_api(&self) -> PathBuf {
        self.install_dir.join("sbin/my_cli_shell_api")
    }

    /// Whether this host carries the CLI the module drives. The agent's
    /// loader checks this before exposing the module.
    pub fn is_available(&self) -> bool {
        self.shell_api().exists()
    }

    fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            program: "su".to_string(),
            args: vec!["-".to_string(), self.login_user.clone()],
            cols: self.term_width,
            read_timeout: self.read_timeout,
            ..ShellConfig::default()
        }
    }
}

/// Output of one router command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Full transcript as received from the shell.
    pub raw: String,
    /// Cleaned output lines.
    pub lines: Vec<String>,
}

/// Snapshot of the session flags, for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub conf_mode: bool,
    pub modified: bool,
    pub saved: bool,
}

/// One live session against a device's interactive shell.
///
/// A session is exclusively owned; every method takes `&mut self` and
/// exactly one logical command sequence runs against it at a time.
pub struct Router {
    shell: Box<dyn Transport>,
    config: RouterConfig,
    conf_mode: bool,
    modified: bool,
    saved: bool,
    op_prompt: Regex,
    config_prompt: Regex,
}

impl Router {
    /// Opens a session: spawns the login shell on a PTY and applies the
    /// configured setup commands.
    pub async fn open(config: RouterConfig) -> Result<Self, Error> {
        let op_prompt = Regex::new(&config.op_prompt_pattern)
            .map_err(|e| Error::InvalidPattern(e.to_string()))?;
        let config_prompt = Regex::new(&config.config_prompt_pattern)
            .map_err(|e| Error::InvalidPattern(e.to_string()))?;

        debug!(user = %config.login_user, "opening router session");
        let mut shell = ShellSession::open(&config.shell_config())?;
        for line in &config.setup_commands {
            shell.send_line(line).await?;
        }

        Ok(Self {
            shell: Box::new(shell),
            config,
            conf_mode: false,
            modified: false,
            saved: true,
            op_prompt,
            config_prompt,
        })
    }

    /// Runs one command as a self-contained exchange: sends it (inside
    /// the configuration bracket when `config_mode` is set), terminates
    /// the shell, and returns the cleaned transcript.
    ///
    /// The bracket is `config`, the command, `commit`, `save` (when
    /// `save_changes`), `exit`. A final `exit` ends the login shell so
    /// the transcript closes with end-of-stream. The session cannot be
    /// reused after this call.
    pub async fn execute_command(
        &mut self,
        command: &str,
        config_mode: bool,
        save_changes: bool,
    ) -> Result<CommandOutput, Error> {
        if config_mode {
            self.shell.send_line("config").await?;
            self.shell.send_line(command).await?;
            self.shell.send_line("commit").await?;
            if save_changes {
                self.shell.send_line("save").await?;
            }
            self.shell.send_line("exit").await?;
        } else {
            self.shell.send_line(command).await?;
        }
        self.shell.send_line("exit").await?;

        let raw = self.shell.read_to_eof().await?;
        if config_mode {
            check_failure_phrases(&raw)?;
        }

        let lines = normalize(&raw, config_mode);
        Ok(CommandOutput { raw, lines })
    }

    /// Enters configuration mode. A no-op when already there.
    pub async fn configure(&mut self) -> Result<(), Error> {
        if self.conf_mode {
            return Ok(());
        }
        self.shell.send_line("config").await?;
        let prompt = self.config_prompt.clone();
        self.shell.read_until(&prompt).await?;
        self.conf_mode = true;
        Ok(())
    }

    /// Creates a configuration node,
    /// e.g. `protocols static route ... next-hop ...`.
    pub async fn set(&mut self, path: &str) -> Result<(), Error> {
        if !self.conf_mode {
            return Err(Error::State(
                "cannot execute set commands when not in configuration mode".into(),
            ));
        }
        let output = self.exchange(&format!("set {path}")).await?;
        if SET_FAILED.is_match(&output) {
            return Err(Error::Config(failure_line(&output, &SET_FAILED)));
        }
        if ALREADY_EXISTS.is_match(&output) {
            return Err(Error::Config("configuration path already exists".into()));
        }
        self.modified = true;
        Ok(())
    }

    /// Deletes a configuration node.
    pub async fn delete(&mut self, path: &str) -> Result<(), Error> {
        if !self.conf_mode {
            return Err(Error::State(
                "cannot execute delete commands when not in configuration mode".into(),
            ));
        }
        let output = self.exchange(&format!("delete {path}")).await?;
        if NOTHING_TO_DELETE.is_match(&output) {
            return Err(Error::Config(failure_line(&output, &NOTHING_TO_DELETE)));
        }
        self.modified = true;
        Ok(())
    }

    /// Applies pending configuration changes to the running system.
    pub async fn commit(&mut self) -> Result<(), Error> {
        if !self.conf_mode {
            return Err(Error::State(
                "cannot commit without entering configuration mode".into(),
            ));
        }
        if !self.modified {
            return Err(Error::State("no configuration changes to commit".into()));
        }

        let output = self.exchange("commit").await?;
        if COMMIT_IN_PROGRESS.is_match(&output) {
            return Err(Error::ConfigLocked);
        }
        if COMMIT_FAILED.is_match(&output) {
            return Err(Error::Commit(failure_line(&output, &COMMIT_FAILED)));
        }

        self.modified = false;
        self.saved = false;
        Ok(())
    }

    /// Persists the committed configuration to the startup config.
    /// Pending uncommitted changes must be committed first.
    pub async fn save(&mut self) -> Result<(), Error> {
        if !self.conf_mode {
            return Err(Error::State(
                "cannot save when not in configuration mode".into(),
            ));
        }
        if self.modified {
            return Err(Error::State(
                "cannot save when there are uncommitted changes".into(),
            ));
        }
        self.exchange("save").await?;
        self.saved = true;
        Ok(())
    }

    /// Leaves configuration mode. A no-op in operational mode.
    ///
    /// Without `force`, exiting with uncommitted or unsaved changes is
    /// refused and the session stays where it is. With `force`,
    /// uncommitted changes are discarded on the way out.
    pub async fn exit(&mut self, force: bool) -> Result<(), Error> {
        if !self.conf_mode {
            return Ok(());
        }

        if self.modified {
            if !force {
                return Err(Error::State(
                    "cannot exit a session with uncommitted changes, use force to discard".into(),
                ));
            }
            self.shell.send_line("exit discard").await?;
            let prompt = self.op_prompt.clone();
            self.shell.read_until(&prompt).await?;
            self.conf_mode = false;
            self.modified = false;
            return Ok(());
        }

        if !self.saved && !force {
            return Err(Error::State(
                "cannot exit a session with unsaved changes, use force to ignore".into(),
            ));
        }

        self.shell.send_line("exit").await?;
        let prompt = self.op_prompt.clone();
        self.shell.read_until(&prompt).await?;
        self.conf_mode = false;
        Ok(())
    }

    /// Runs an operational command in the live session. Inside
    /// configuration mode the command gets the `run` prefix.
    pub async fn run_op_command(&mut self, command: &str) -> Result<CommandOutput, Error> {
        let line = if self.conf_mode {
            format!("run {command}")
        } else {
            command.to_string()
        };
        let raw = self.exchange(&line).await?;
        let lines = normalize(&raw, false);
        Ok(CommandOutput { raw, lines })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Current session flags.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            conf_mode: self.conf_mode,
            modified: self.modified,
            saved: self.saved,
        }
    }

    /// Closes and terminates the session. The shell child is killed
    /// even when it already went away on its own.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.shell.close().await
    }

    async fn exchange(&mut self, line: &str) -> Result<String, Error> {
        let prompt = if self.conf_mode {
            self.config_prompt.clone()
        } else {
            self.op_prompt.clone()
        };
        self.shell.send_line(line).await?;
        self.shell.read_until(&prompt).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("conf_mode", &self.conf_mode)
            .field("modified", &self.modified)
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}

/// Executes an operational command through a fresh one-shot session.
///
/// Only `show` commands are accepted; anything else is rejected here
/// without a session ever being opened.
pub async fn run_op_mode_command(
    config: &RouterConfig,
    command: &str,
) -> Result<CommandOutput, Error> {
    if first_token(command) != Some("show") {
        return Err(Error::InvalidCommand(
            "op mode commands must begin with \"show\"".into(),
        ));
    }

    let mut router = Router::open(config.clone()).await?;
    let line = if router.conf_mode {
        format!("run {command}")
    } else {
        command.to_string()
    };
    let result = router.execute_command(&line, false, false).await;
    let closed = router.close().await;
    let output = result?;
    closed?;
    Ok(output)
}

/// Executes a configuration command through a fresh one-shot session,
/// wrapped in the config-mode bracket. `save_changes` controls whether
/// the bracket persists the result to the startup config.
///
/// The command's first token must be on the configuration allow-list;
/// anything else is rejected without a session being opened.
pub async fn run_config_mode_command(
    config: &RouterConfig,
    command: &str,
    save_changes: bool,
) -> Result<CommandOutput, Error> {
    let accepted = first_token(command).is_some_and(|t| CONFIG_MODE_COMMANDS.contains(&t));
    if !accepted {
        return Err(Error::InvalidCommand(format!(
            "configuration mode commands must begin with one of: {}",
            CONFIG_MODE_COMMANDS.join(", ")
        )));
    }

    let mut router = Router::open(config.clone()).await?;
    let result = router.execute_command(command, true, save_changes).await;
    let closed = router.close().await;
    let output = result?;
    closed?;
    Ok(output)
}

fn first_token(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

/// Maps known device failure phrases in a raw transcript to errors.
fn check_failure_phrases(raw: &str) -> Result<(), Error> {
    if COMMIT_IN_PROGRESS.is_match(raw) {
        return Err(Error::ConfigLocked);
    }
    if COMMIT_FAILED.is_match(raw) {
        return Err(Error::Commit(failure_line(raw, &COMMIT_FAILED)));
    }
    if SET_FAILED.is_match(raw) {
        return Err(Error::Config(failure_line(raw, &SET_FAILED)));
    }
    if ALREADY_EXISTS.is_match(raw) {
        return Err(Error::Config("configuration path already exists".into()));
    }
    if NOTHING_TO_DELETE.is_match(raw) {
        return Err(Error::Config(failure_line(raw, &NOTHING_TO_DELETE)));
    }
    Ok(())
}

/// The line carrying the failure phrase, or the phrase itself when the
/// transcript got mangled.
fn failure_line(raw: &str, pattern: &Regex) -> String {
    raw.lines()
        .find(|line| pattern.is_match(line))
        .unwrap_or("device reported a failure")
        .trim()
        .to_string()
}
