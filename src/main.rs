//! SFC Redirection CLI
//!
//! Operator front end for the redirection API. Each invocation performs one
//! operation against the configured provider and prints the result as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sfc_redirection::{
    InspectionHook, InspectionPort, NetworkElement, ProviderKind, RedirectionApiFactory, RedirectionConfig,
    SdnRedirectionApi, ServiceFunctionChain,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// SFC Redirection - steer traffic through inspection chains on Neutron SFC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "SFC_CONFIG")]
    config: Option<PathBuf>,

    /// Provider to talk to
    #[arg(long, env = "SFC_PROVIDER", value_enum)]
    provider: Option<ProviderKind>,

    /// Neutron network endpoint
    #[arg(long, env = "NEUTRON_ENDPOINT")]
    network_endpoint: Option<String>,

    /// Keystone v3 auth URL
    #[arg(long, env = "OS_AUTH_URL")]
    auth_url: Option<String>,

    #[arg(long, env = "OS_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "OS_PROJECT_NAME")]
    project_name: Option<String>,

    #[arg(long, env = "OS_USER_DOMAIN_NAME")]
    user_domain_name: Option<String>,

    #[arg(long, env = "OS_PROJECT_DOMAIN_NAME")]
    project_domain_name: Option<String>,

    #[arg(long, env = "OS_REGION_NAME")]
    region: Option<String>,

    /// Pre-issued token, skips Keystone authentication
    #[arg(long, env = "OS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Binding-profile key used to tag inspected ports
    #[arg(long, env = "SFC_HOOK_TAG_KEY")]
    hook_tag_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an inspection port (find-or-create)
    RegisterPort {
        #[arg(long)]
        ingress: String,
        #[arg(long)]
        egress: String,
        /// Existing port pair group to join
        #[arg(long)]
        group: Option<String>,
    },
    /// Show an inspection port by id or by ingress/egress
    ShowPort(PortSelector),
    /// Remove an inspection port, and its group once empty
    RemovePort(PortSelector),
    /// Create a chain from port pair groups, in traffic order
    CreateChain {
        #[arg(required = true)]
        groups: Vec<String>,
    },
    /// Replace the port pair groups of a chain
    UpdateChain {
        #[arg(long)]
        chain: String,
        #[arg(required = true)]
        groups: Vec<String>,
    },
    DeleteChain {
        chain: String,
    },
    ShowChain {
        chain: String,
    },
    /// Redirect traffic of an inspected port through a chain
    InstallHook {
        #[arg(long)]
        inspected: String,
        #[arg(long)]
        chain: String,
    },
    /// Point an existing hook at another chain
    UpdateHook {
        #[arg(long)]
        hook: String,
        #[arg(long)]
        inspected: String,
        #[arg(long)]
        chain: String,
    },
    RemoveHook {
        hook: String,
    },
    ShowHook {
        hook: String,
    },
}

#[derive(clap::Args, Debug)]
struct PortSelector {
    /// Port pair id
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    ingress: Option<String>,
    #[arg(long)]
    egress: Option<String>,
}

impl PortSelector {
    fn to_inspection_port(&self) -> InspectionPort {
        InspectionPort {
            element_id: self.id.clone(),
            parent_id: None,
            ingress_port: self.ingress.as_ref().map(NetworkElement::with_id),
            egress_port: self.egress.as_ref().map(NetworkElement::with_id),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!("Starting SFC Redirection {}", sfc_redirection::VERSION);
    info!("  Provider: {}", config.provider);
    if config.provider == ProviderKind::Neutron {
        info!("  Neutron endpoint: {}", config.neutron.network_endpoint);
    }

    let api = RedirectionApiFactory::create(&config).context("failed to build redirection API")?;

    let result = run(api.as_ref(), args.command).await;
    api.close().await?;
    result
}

async fn run(api: &dyn SdnRedirectionApi, command: Command) -> anyhow::Result<()> {
    match command {
        Command::RegisterPort { ingress, egress, group } => {
            let mut request = InspectionPort::new(NetworkElement::with_id(ingress), NetworkElement::with_id(egress));
            if let Some(group) = group {
                request = request.with_parent(group);
            }
            print_json(&api.register_inspection_port(&request).await?)
        }
        Command::ShowPort(selector) => {
            let found = api.get_inspection_port(&selector.to_inspection_port()).await?;
            print_json(&found)
        }
        Command::RemovePort(selector) => {
            api.remove_inspection_port(&selector.to_inspection_port()).await?;
            print_json(&serde_json::json!({"removed": true}))
        }
        Command::CreateChain { groups } => {
            let groups = to_elements(&groups);
            print_json(&api.register_network_element(&groups).await?)
        }
        Command::UpdateChain { chain, groups } => {
            let groups = to_elements(&groups);
            let chain = NetworkElement::with_id(chain);
            print_json(&api.update_network_element(&chain, &groups).await?)
        }
        Command::DeleteChain { chain } => {
            api.delete_network_element(&NetworkElement::with_id(chain.clone())).await?;
            print_json(&serde_json::json!({"deleted": chain}))
        }
        Command::ShowChain { chain } => {
            print_json(&api.get_network_elements(&NetworkElement::with_id(chain)).await?)
        }
        Command::InstallHook { inspected, chain } => {
            let hook_id = api
                .install_inspection_hook(
                    &NetworkElement::with_id(inspected),
                    &NetworkElement::with_id(chain),
                    None,
                    None,
                    None,
                    None,
                )
                .await?;
            print_json(&serde_json::json!({"hookId": hook_id}))
        }
        Command::UpdateHook { hook, inspected, chain } => {
            let mut update = InspectionHook::new(NetworkElement::with_id(inspected), ServiceFunctionChain::new(chain));
            update.hook_id = Some(hook.clone());
            api.update_inspection_hook(&update).await?;
            print_json(&api.get_inspection_hook(&hook).await?)
        }
        Command::RemoveHook { hook } => {
            api.remove_inspection_hook(&hook).await?;
            print_json(&serde_json::json!({"removed": hook}))
        }
        Command::ShowHook { hook } => print_json(&api.get_inspection_hook(&hook).await?),
    }
}

fn to_elements(ids: &[String]) -> Vec<NetworkElement> {
    ids.iter().map(NetworkElement::with_id).collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<RedirectionConfig> {
    let mut config = match &args.config {
        Some(path) => RedirectionConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => RedirectionConfig::default(),
    };

    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(key) = &args.hook_tag_key {
        config.hook_tag_key = key.clone();
    }

    let neutron = &mut config.neutron;
    let overrides = [
        (&args.network_endpoint, &mut neutron.network_endpoint),
        (&args.auth_url, &mut neutron.auth_url),
        (&args.username, &mut neutron.username),
        (&args.password, &mut neutron.password),
        (&args.project_name, &mut neutron.project_name),
        (&args.user_domain_name, &mut neutron.user_domain_name),
        (&args.project_domain_name, &mut neutron.project_domain_name),
        (&args.region, &mut neutron.region),
    ];
    for (value, field) in overrides {
        if let Some(v) = value {
            *field = v.clone();
        }
    }
    if args.token.is_some() {
        neutron.token = args.token.clone();
    }

    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    // stdout carries the JSON results
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
