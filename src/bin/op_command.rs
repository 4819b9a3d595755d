use std::env;

use tracing_subscriber::EnvFilter;
use vyshell::{router, RouterConfig};

#[tokio::main]
async fn main() -> Result<(), vyshell::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let command: String = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let command = if command.is_empty() {
        "show interfaces".to_string()
    } else {
        command
    };

    let config = RouterConfig::default();
    let output = router::run_op_mode_command(&config, &command).await?;
    for line in &output.lines {
        println!("{line}");
    }

    Ok(())
}
