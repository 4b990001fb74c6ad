mod args;

use anyhow::Result;
use hiveboard_server::config::ServerConfig;

pub use args::{Cli, Command};

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { config, listen } => {
            let mut server_config = ServerConfig::load_from(&config)?;
            if let Some(listen) = listen {
                server_config.listen = listen;
            }
            hiveboard_server::serve(server_config).await
        }
        Command::CheckConfig { config } => {
            let server_config = ServerConfig::load_from(&config)?;
            server_config.validate()?;
            println!("configuration ok:");
            println!("  data_dir: {}", server_config.data_dir.display());
            println!("  mode: {:?}", server_config.mode);
            println!("  listen: {}", server_config.listen);
            println!(
                "  stuck_threshold_seconds: {}",
                server_config.stuck_threshold_seconds
            );
            println!(
                "  ws_gateway_endpoint: {}",
                server_config.ws_gateway_endpoint.as_deref().unwrap_or("-")
            );
            println!(
                "  dev_key: {}",
                if server_config.dev_key.is_some() {
                    "configured"
                } else {
                    "-"
                }
            );
            Ok(())
        }
    }
}
