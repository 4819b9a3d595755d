use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use vyshell::hypervisor::{self, DomainState, LibvirtHypervisor};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let pattern = args.next().unwrap_or_else(|| ".*".to_string());
    let state = args
        .next()
        .as_deref()
        .map_or(Some(DomainState::All), DomainState::from_name);

    let Some(state) = state else {
        eprintln!("usage: domains [pattern] [all|running|shutdown]");
        return ExitCode::FAILURE;
    };

    let hv = LibvirtHypervisor::system();
    match hypervisor::list(&hv, &pattern, state).await {
        Some(names) => {
            for name in names {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("could not list domains; check the log for details");
            ExitCode::FAILURE
        }
    }
}
