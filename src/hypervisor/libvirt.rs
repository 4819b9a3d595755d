//! libvirt-backed [`Hypervisor`] implementation.
//!
//! Each operation opens its own connection to the daemon and closes it
//! before returning, the same one-shot style the agent modules use for
//! the router shell. The libvirt calls block, so they run on the
//! blocking thread pool.

use async_trait::async_trait;
use tokio::task;
use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;

use super::{DomainState, Hypervisor};
use crate::error::Error;

/// Hypervisor backend speaking to a libvirt daemon.
#[derive(Debug, Clone)]
pub struct LibvirtHypervisor {
    uri: String,
}

impl LibvirtHypervisor {
    /// Backend for an arbitrary libvirt URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Backend for the host's system daemon (`qemu:///system`).
    pub fn system() -> Self {
        Self::new("qemu:///system")
    }

    fn list_flags(state: DomainState) -> sys::virConnectListAllDomainsFlags {
        match state {
            DomainState::All => 0,
            DomainState::Running => sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE,
            DomainState::Shutdown => sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE,
        }
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connect) -> Result<T, Error> + Send + 'static,
    {
        let uri = self.uri.clone();
        task::spawn_blocking(move || {
            let mut conn = Connect::open(Some(&uri)).map_err(hv_err)?;
            let result = op(&conn);
            let _ = conn.close();
            result
        })
        .await
        .map_err(hv_err)?
    }
}

#[async_trait]
impl Hypervisor for LibvirtHypervisor {
    async fn list_domains(&self, state: DomainState) -> Result<Vec<String>, Error> {
        let flags = Self::list_flags(state);
        self.with_connection(move |conn| {
            let domains = conn.list_all_domains(flags).map_err(hv_err)?;
            let mut names = Vec::with_capacity(domains.len());
            for domain in domains {
                names.push(domain.get_name().map_err(hv_err)?);
            }
            Ok(names)
        })
        .await
    }

    async fn start(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.with_connection(move |conn| {
            let domain = Domain::lookup_by_name(conn, &name).map_err(hv_err)?;
            domain.create().map(|_| ()).map_err(hv_err)
        })
        .await
    }

    async fn shutdown(&self, name: &str, force: bool) -> Result<(), Error> {
        let name = name.to_string();
        self.with_connection(move |conn| {
            let domain = Domain::lookup_by_name(conn, &name).map_err(hv_err)?;
            if force {
                domain.destroy().map(|_| ()).map_err(hv_err)
            } else {
                domain.shutdown().map(|_| ()).map_err(hv_err)
            }
        })
        .await
    }

    async fn reboot(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.with_connection(move |conn| {
            let domain = Domain::lookup_by_name(conn, &name).map_err(hv_err)?;
            domain.reboot(0).map(|_| ()).map_err(hv_err)
        })
        .await
    }
}

fn hv_err<E: std::fmt::Display>(err: E) -> Error {
    Error::Hypervisor(err.to_string())
}
