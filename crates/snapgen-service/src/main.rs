use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use snapgen_compose::Complexity;
use snapgen_service::{
    admin_request, AdminRequest, AdminServer, ExecutionMode, GenerateRequest, ServiceConfig,
    SnapService,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Command::new("snapgen")
        .version(snapgen_service::VERSION)
        .about("Natural-language Snap! block generation with a live renderer bridge")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("serve").about("Run the renderer bridge and the admin endpoint"))
        .subcommand(
            Command::new("session")
                .about("Ask the running server for a session code")
                .arg(Arg::new("user").default_value("default").help("User id")),
        )
        .subcommand(Command::new("sessions").about("List the running server's sessions"))
        .subcommand(
            Command::new("generate")
                .about("Generate a program without a renderer")
                .arg(Arg::new("description").required(true).help("What the program should do"))
                .arg(
                    Arg::new("target")
                        .long("target")
                        .default_value("Sprite")
                        .help("Sprite the scripts belong to"),
                )
                .arg(
                    Arg::new("complexity")
                        .long("complexity")
                        .default_value("beginner")
                        .value_parser(["beginner", "intermediate", "advanced"]),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("preview")
                        .value_parser(["preview", "explain"]),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    }
    .resolve_from_env();

    match matches.subcommand() {
        Some(("serve", _)) => serve(&config).await,
        Some(("session", args)) => {
            let user_id = args
                .get_one::<String>("user")
                .map_or_else(|| "default".to_string(), Clone::clone);
            let reply = admin_request(&config.admin, &AdminRequest::StartSession { user_id }).await?;
            print_json(&reply)
        }
        Some(("sessions", _)) => {
            print_json(&admin_request(&config.admin, &AdminRequest::ListSessions).await?)
        }
        Some(("generate", args)) => generate(&config, args).await,
        _ => Ok(()),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapgen=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: &ServiceConfig) -> Result<()> {
    let service = Arc::new(SnapService::from_config(config)?);
    let listener = service.bridge().bind().await?;
    tracing::info!(url = %config.bridge.websocket_url(), "bridge listening");
    let server = service.bridge().spawn(listener);
    let admin_listener = AdminServer::bind(&config.admin).await?;
    tracing::info!(url = %config.admin.url(), "admin endpoint listening");
    let admin = AdminServer::new(Arc::clone(&service)).spawn(admin_listener);

    let purge = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                let service = Arc::clone(&service);
                match tokio::task::spawn_blocking(move || service.purge_expired()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(purged)) => tracing::info!(purged, "expired sessions removed"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "session purge failed"),
                    Err(e) => tracing::warn!(error = %e, "session purge task failed"),
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    purge.abort();
    admin.abort();
    server.abort();
    Ok(())
}

async fn generate(config: &ServiceConfig, args: &ArgMatches) -> Result<()> {
    let service = SnapService::from_config(config)?;
    let description = args
        .get_one::<String>("description")
        .context("description is required")?;
    let complexity: Complexity = parse_arg(args, "complexity")?;
    let mode: ExecutionMode = parse_arg(args, "mode")?;
    let mut request = GenerateRequest::new(description.as_str())
        .with_complexity(complexity)
        .with_mode(mode);
    if let Some(target) = args.get_one::<String>("target") {
        request = request.with_target(target.as_str());
    }
    print_json(&service.generate_blocks(&request).await)
}

fn parse_arg<T: std::str::FromStr<Err = String>>(args: &ArgMatches, name: &str) -> Result<T> {
    let raw = args
        .get_one::<String>(name)
        .with_context(|| format!("{name} is required"))?;
    raw.parse().map_err(anyhow::Error::msg)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
