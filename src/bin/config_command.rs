use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use vyshell::{router, RouterConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let command: String = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if command.is_empty() {
        eprintln!("usage: config_command <configuration command>");
        return ExitCode::FAILURE;
    }

    let config = RouterConfig::default();
    match router::run_config_mode_command(&config, &command, true).await {
        Ok(output) => {
            for line in &output.lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
