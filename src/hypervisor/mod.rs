//! Hypervisor domain listing and lifecycle.
//!
//! The agent-facing functions in this module mirror what a minion-side
//! execution module exposes: list domains by name pattern, start, shut
//! down, or reboot them. Failures from the management library never
//! propagate to the caller; they are logged and collapsed into `None`
//! or `false`, so a remote invocation sees a clean sentinel instead of
//! a backend stack trace.
//!
//! The [`Hypervisor`] trait is the seam to the real backend. The
//! libvirt implementation lives behind the `libvirt` cargo feature so
//! the default build carries no C library dependency.

#[cfg(feature = "libvirt")]
mod libvirt;

#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtHypervisor;

use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::error::Error;

/// Which domains an enumeration should return.
///
/// The numeric codes are the management library's list filters:
/// `0` selects everything, `1` the running domains, `2` the shut-down
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainState {
    #[default]
    All,
    Running,
    Shutdown,
}

impl DomainState {
    /// Numeric filter code for the management library.
    pub fn code(self) -> u32 {
        match self {
            DomainState::All => 0,
            DomainState::Running => 1,
            DomainState::Shutdown => 2,
        }
    }

    /// Parses the state names accepted on the agent's command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(DomainState::All),
            "running" => Some(DomainState::Running),
            "shutdown" => Some(DomainState::Shutdown),
            _ => None,
        }
    }
}

/// Backend for domain enumeration and lifecycle calls.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Names of the domains matching the state filter, in backend order.
    async fn list_domains(&self, state: DomainState) -> Result<Vec<String>, Error>;

    /// Starts a defined domain.
    async fn start(&self, name: &str) -> Result<(), Error>;

    /// Shuts a domain down gracefully, or pulls the plug when `force`.
    async fn shutdown(&self, name: &str, force: bool) -> Result<(), Error>;

    /// Requests a graceful reboot.
    async fn reboot(&self, name: &str) -> Result<(), Error>;
}

/// Lists domains whose names match `pattern`, preserving backend order.
///
/// Matching is a case-insensitive regex search with multi-line and
/// dot-matches-newline semantics. Returns `None` when the backend
/// enumeration fails; the cause goes to the log only.
pub async fn list(
    hv: &dyn Hypervisor,
    pattern: &str,
    state: DomainState,
) -> Option<Vec<String>> {
    info!(?state, "listing domains");
    let names = match hv.list_domains(state).await {
        Ok(names) => names,
        Err(err) => {
            debug!(%err, "unable to list domains");
            return None;
        }
    };
    let matcher = match name_matcher(pattern) {
        Ok(matcher) => matcher,
        Err(err) => {
            debug!(%err, pattern, "invalid domain match pattern");
            return None;
        }
    };

    debug!(?names, "looking for matches");
    Some(
        names
            .into_iter()
            .filter(|name| matcher.is_match(name))
            .collect(),
    )
}

/// Starts a domain. `false` on any failure, with the detail logged.
pub async fn start(hv: &dyn Hypervisor, name: &str) -> bool {
    info!(name, "starting domain");
    match hv.start(name).await {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, name, "failed to start domain");
            false
        }
    }
}

/// Shuts a domain down, forcibly when asked. `false` on any failure.
pub async fn shutdown(hv: &dyn Hypervisor, name: &str, force: bool) -> bool {
    info!(name, force, "shutting down domain");
    match hv.shutdown(name, force).await {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, name, "shutdown failed");
            false
        }
    }
}

/// Reboots a domain gracefully. `false` on any failure.
pub async fn reboot(hv: &dyn Hypervisor, name: &str) -> bool {
    info!(name, "rebooting domain");
    match hv.reboot(name).await {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, name, "reboot failed");
            false
        }
    }
}

/// Starts every domain whose name matches `pattern`, waiting `delay`
/// between starts so a host is not hit with a thundering herd of
/// guests. Per-domain failures are logged and skipped.
///
/// Returns the full enumeration (not just the matches), or `None` when
/// the enumeration itself fails.
pub async fn start_matching(
    hv: &dyn Hypervisor,
    pattern: &str,
    delay: Duration,
) -> Option<Vec<String>> {
    let names = match hv.list_domains(DomainState::All).await {
        Ok(names) => names,
        Err(err) => {
            debug!(%err, "failed to get a list of domains");
            return None;
        }
    };
    let matcher = match name_matcher(pattern) {
        Ok(matcher) => matcher,
        Err(err) => {
            debug!(%err, pattern, "invalid domain match pattern");
            return None;
        }
    };

    debug!(?names, "domains");
    let mut started_any = false;
    for name in &names {
        if !matcher.is_match(name) {
            continue;
        }
        if started_any {
            tokio::time::sleep(delay).await;
        }
        info!(name, "starting domain");
        if let Err(err) = hv.start(name).await {
            debug!(%err, name, "failed to start domain");
        }
        started_any = true;
    }
    Some(names)
}

/// Shuts down every domain whose name matches `pattern`, forcibly when
/// asked. Per-domain failures are logged and skipped.
///
/// Returns the full enumeration, or `None` when it fails.
pub async fn shutdown_matching(
    hv: &dyn Hypervisor,
    pattern: &str,
    force: bool,
) -> Option<Vec<String>> {
    let names = match hv.list_domains(DomainState::All).await {
        Ok(names) => names,
        Err(err) => {
            debug!(%err, "failed to get a list of domains");
            return None;
        }
    };
    let matcher = match name_matcher(pattern) {
        Ok(matcher) => matcher,
        Err(err) => {
            debug!(%err, pattern, "invalid domain match pattern");
            return None;
        }
    };

    debug!(?names, "domains");
    for name in &names {
        if !matcher.is_match(name) {
            continue;
        }
        info!(name, "shutting down domain");
        if let Err(err) = hv.shutdown(name, force).await {
            debug!(%err, name, "failed to shut down domain");
        }
    }
    Some(names)
}

fn name_matcher(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// In-memory backend with a fixed domain table.
    struct MockHypervisor {
        domains: Vec<(String, DomainState)>,
        fail_listing: bool,
        actions: Arc<Mutex<Vec<String>>>,
    }

    impl MockHypervisor {
        fn new(domains: &[(&str, DomainState)]) -> Self {
            Self {
                domains: domains
                    .iter()
                    .map(|(name, state)| (name.to_string(), *state))
                    .collect(),
                fail_listing: false,
                actions: Arc::default(),
            }
        }

        fn failing() -> Self {
            Self {
                domains: Vec::new(),
                fail_listing: true,
                actions: Arc::default(),
            }
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }

        fn lookup(&self, name: &str) -> Result<(), Error> {
            if self.domains.iter().any(|(n, _)| n == name) {
                Ok(())
            } else {
                Err(Error::Hypervisor(format!("domain not found: {name}")))
            }
        }
    }

    #[async_trait]
    impl Hypervisor for MockHypervisor {
        async fn list_domains(&self, state: DomainState) -> Result<Vec<String>, Error> {
            if self.fail_listing {
                return Err(Error::Hypervisor("connection refused".into()));
            }
            Ok(self
                .domains
                .iter()
                .filter(|(_, s)| state == DomainState::All || *s == state)
                .map(|(name, _)| name.clone())
                .collect())
        }

        async fn start(&self, name: &str) -> Result<(), Error> {
            self.lookup(name)?;
            self.actions.lock().unwrap().push(format!("start {name}"));
            Ok(())
        }

        async fn shutdown(&self, name: &str, force: bool) -> Result<(), Error> {
            self.lookup(name)?;
            let verb = if force { "destroy" } else { "shutdown" };
            self.actions.lock().unwrap().push(format!("{verb} {name}"));
            Ok(())
        }

        async fn reboot(&self, name: &str) -> Result<(), Error> {
            self.lookup(name)?;
            self.actions.lock().unwrap().push(format!("reboot {name}"));
            Ok(())
        }
    }

    fn web_farm() -> MockHypervisor {
        MockHypervisor::new(&[
            ("web1", DomainState::Running),
            ("web2", DomainState::Running),
            ("db1", DomainState::Running),
        ])
    }

    #[tokio::test]
    async fn listing_filters_running_domains_by_pattern() {
        let hv = web_farm();
        let names = list(&hv, "^web", DomainState::Running).await.unwrap();
        assert_eq!(names, vec!["web1", "web2"]);
    }

    #[tokio::test]
    async fn listing_is_case_insensitive_and_order_preserving() {
        let hv = MockHypervisor::new(&[
            ("WEB1", DomainState::Running),
            ("db1", DomainState::Shutdown),
            ("Web2", DomainState::Running),
        ]);
        let names = list(&hv, "^web", DomainState::All).await.unwrap();
        assert_eq!(names, vec!["WEB1", "Web2"]);
    }

    #[tokio::test]
    async fn state_filtering_happens_in_the_backend() {
        let hv = MockHypervisor::new(&[
            ("web1", DomainState::Running),
            ("web2", DomainState::Shutdown),
        ]);
        let names = list(&hv, ".*", DomainState::Shutdown).await.unwrap();
        assert_eq!(names, vec!["web2"]);
    }

    #[tokio::test]
    async fn listing_failure_collapses_to_none() {
        let hv = MockHypervisor::failing();
        assert_eq!(list(&hv, ".*", DomainState::All).await, None);
    }

    #[tokio::test]
    async fn invalid_pattern_collapses_to_none() {
        let hv = web_farm();
        assert_eq!(list(&hv, "(unclosed", DomainState::All).await, None);
    }

    #[tokio::test]
    async fn lifecycle_calls_report_success_as_true() {
        let hv = web_farm();
        assert!(start(&hv, "web1").await);
        assert!(shutdown(&hv, "web2", false).await);
        assert!(shutdown(&hv, "db1", true).await);
        assert!(reboot(&hv, "web1").await);
        assert_eq!(
            hv.actions(),
            vec!["start web1", "shutdown web2", "destroy db1", "reboot web1"]
        );
    }

    #[tokio::test]
    async fn lifecycle_failures_collapse_to_false() {
        let hv = web_farm();
        assert!(!start(&hv, "ghost").await);
        assert!(!shutdown(&hv, "ghost", true).await);
        assert!(!reboot(&hv, "ghost").await);
        assert!(hv.actions().is_empty());
    }

    #[tokio::test]
    async fn start_matching_starts_only_matches_but_returns_everything() {
        let hv = web_farm();
        let names = start_matching(&hv, "^web", Duration::ZERO).await.unwrap();
        assert_eq!(names, vec!["web1", "web2", "db1"]);
        assert_eq!(hv.actions(), vec!["start web1", "start web2"]);
    }

    #[tokio::test]
    async fn shutdown_matching_honors_the_force_flag() {
        let hv = web_farm();
        let names = shutdown_matching(&hv, "^db", true).await.unwrap();
        assert_eq!(names, vec!["web1", "web2", "db1"]);
        assert_eq!(hv.actions(), vec!["destroy db1"]);
    }

    #[tokio::test]
    async fn matching_helpers_collapse_enumeration_failure_to_none() {
        let hv = MockHypervisor::failing();
        assert_eq!(start_matching(&hv, ".*", Duration::ZERO).await, None);
        assert_eq!(shutdown_matching(&hv, ".*", false).await, None);
    }

    #[test]
    fn state_codes_match_the_library_filters() {
        assert_eq!(DomainState::All.code(), 0);
        assert_eq!(DomainState::Running.code(), 1);
        assert_eq!(DomainState::Shutdown.code(), 2);
        assert_eq!(DomainState::from_name("running"), Some(DomainState::Running));
        assert_eq!(DomainState::from_name("paused"), None);
    }
}
