use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use ocivm_common::error::{Error, Result};
use ocivm_common::ProvisionRequest;
use ocivm_provisioner::{services, Provisioner};
use ocivm_providers::{Credentials, ProviderClients};

/// Compute instance control: launch, list and terminate instances against
/// the provider's compute/network API.
#[derive(Parser)]
#[command(name = "ocivm", version, about = "Launch, list and terminate compute instances")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch an instance and wait for it to reach RUNNING
    Launch(LaunchArgs),

    /// List instances in the compartment
    List {
        /// Exact lifecycle state to keep (e.g. RUNNING, STOPPED)
        #[arg(long)]
        state: Option<String>,
    },

    /// Request termination of an instance by id
    Terminate {
        /// Instance OCID
        instance_id: String,
    },

    /// Check credential resolution and API access
    ConfigCheck,
}

#[derive(clap::Args)]
struct LaunchArgs {
    /// Display name for the new instance
    #[arg(long)]
    name: String,

    /// Compute shape
    #[arg(long, default_value = "VM.Standard.A1.Flex")]
    shape: String,

    /// OCPU count (flexible shapes only)
    #[arg(long, default_value_t = 1.0)]
    ocpus: f64,

    /// Memory in GB (flexible shapes only)
    #[arg(long, default_value_t = 6.0)]
    memory_gb: f64,

    /// Operating system family
    #[arg(long, default_value = "Canonical Ubuntu")]
    os: String,

    /// Operating system version
    #[arg(long, default_value = "22.04")]
    os_version: String,

    /// Path to the SSH public key injected at launch
    #[arg(long, default_value = "~/.ssh/id_rsa.pub")]
    ssh_key: String,

    /// Prefer the first subnet whose name contains this
    #[arg(long)]
    subnet: Option<String>,

    /// Give up after this many seconds (the instance is NOT terminated on
    /// timeout). Default: wait until the provider reports a terminal state.
    #[arg(long)]
    max_wait: Option<u64>,

    /// Write a JSON deployment summary here after success
    #[arg(long)]
    summary_file: Option<PathBuf>,

    /// Launch without a public IP
    #[arg(long)]
    private: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command).await {
        eprintln!("error: {err}");
        std::process::exit(exit_code(&err));
    }
}

/// 0 success, 2 configuration, 3 not found, 1 everything else.
fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Configuration { .. } => 2,
        Error::NotFound { .. } | Error::KeyNotFound { .. } => 3,
        _ => 1,
    }
}

async fn run(command: Commands) -> Result<()> {
    let credentials = Credentials::resolve()?;
    let clients = ProviderClients::from_credentials(&credentials)?;

    match command {
        Commands::Launch(args) => launch(clients, args).await,
        Commands::List { state } => list(clients, state.as_deref()).await,
        Commands::Terminate { instance_id } => terminate(clients, &instance_id).await,
        Commands::ConfigCheck => config_check(clients, &credentials).await,
    }
}

async fn launch(clients: ProviderClients, args: LaunchArgs) -> Result<()> {
    println!("🚀 Launching {} ({})", args.name, args.shape);

    let request = ProvisionRequest {
        display_name: args.name,
        shape: args.shape,
        ocpus: args.ocpus,
        memory_gb: args.memory_gb,
        os_family: args.os,
        os_version: args.os_version,
        ssh_key_path: args.ssh_key,
        subnet_hint: args.subnet,
        assign_public_ip: !args.private,
    };
    let provisioner = Provisioner::new(clients)
        .with_max_wait(args.max_wait.map(Duration::from_secs))
        .with_summary_path(args.summary_file);

    let result = provisioner.provision(&request).await?;

    println!("✅ {} is RUNNING", result.instance.display_name);
    println!("   Instance ID: {}", result.instance.id);
    if let Some(ip) = &result.network_interface.public_ip {
        println!("   Public IP:   {ip}");
    }
    if let Some(ip) = &result.network_interface.private_ip {
        println!("   Private IP:  {ip}");
    }
    println!("   SSH:         {}", result.ssh_hint);
    Ok(())
}

async fn list(clients: ProviderClients, state: Option<&str>) -> Result<()> {
    let summaries = services::list_instances(&clients, state).await?;
    if summaries.is_empty() {
        println!("No instances found");
        return Ok(());
    }
    for summary in summaries {
        println!("• {} [{}]", summary.display_name, summary.lifecycle_state);
        println!("  ID:    {}", summary.id);
        println!("  Shape: {}", summary.shape);
        println!("  IP:    {}", summary.public_ip.as_deref().unwrap_or("N/A"));
        if let Some(created) = summary.time_created {
            println!("  Created: {}", created.to_rfc3339());
        }
        println!();
    }
    Ok(())
}

async fn terminate(clients: ProviderClients, instance_id: &str) -> Result<()> {
    let receipt = services::terminate_instance(&clients, instance_id).await?;
    println!(
        "🗑️  Termination requested for {} ({})",
        receipt.display_name, receipt.instance_id
    );
    println!("   Previous state: {}", receipt.previous_state);
    Ok(())
}

async fn config_check(clients: ProviderClients, credentials: &Credentials) -> Result<()> {
    let report = services::check_config(&clients, credentials).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_default()
    );
    if report.api_access != "ok" {
        return Err(Error::rejected("config_check", None, report.api_access));
    }
    Ok(())
}
