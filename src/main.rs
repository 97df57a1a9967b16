mod cli;

use streamforged::{
    config,
    library::{InMemoryLibrary, MediaLibrary},
    server::{self, auth},
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Streamforged server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let library: Arc<dyn MediaLibrary> = match &config.library.catalog {
        Some(path) => {
            let library = InMemoryLibrary::load(path)?;
            tracing::info!("Loaded {} media files from {:?}", library.len(), path);
            Arc::new(library)
        }
        None => {
            tracing::warn!("No library catalog configured, serving an empty library");
            Arc::new(InMemoryLibrary::new())
        }
    };

    server::start_server(config, library).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamforged=trace,streamforged_av=trace,streamforged_media=trace,tower_http=debug"
                .to_string()
        } else {
            "streamforged=debug,streamforged_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("streamforged {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::GenerateSecret => {
            println!("{}", auth::generate_secret());
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = streamforged_av::check_tools(config.tools.ffmpeg_path.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All transcoders are available!");
    } else {
        println!("Some transcoders are missing. Files that need them will fail to stream.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Max concurrent streams: {}",
        config.streaming.max_concurrent_streams
    );
    println!(
        "  Signing secret: {}",
        if config.signing.secret.is_some() {
            "configured"
        } else {
            "ephemeral"
        }
    );
    println!("  Transcoding rules: {}", config.transcoding.rules.len());
    println!("  Users: {}", config.users.len());
    println!("  Players: {}", config.players.len());

    Ok(())
}
