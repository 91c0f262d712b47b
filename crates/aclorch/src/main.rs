//! aclorch - offline network ACL tool.
//!
//! Validates and compiles the ACLs of a policy document and prints the
//! result as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use netacl_aclorch::acl::{
    compile_acl, compile_firewall_rules, network_substitutions, resolve_references, Acl,
    CompiledAcl,
};
use netacl_aclorch::db::NetworkType;
use netacl_aclorch::ovn::names::{acl_network_port_group, acl_port_group};
use netacl_aclorch::{AclOrchConfig, PolicyDocument};

/// Network ACL compiler
#[derive(Parser, Debug)]
#[command(name = "aclorch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every ACL in a policy document
    Validate {
        /// Policy document (YAML or JSON)
        policy: PathBuf,
    },
    /// Compile ACLs to control-plane rules
    Compile {
        policy: PathBuf,
        /// Only compile this ACL
        #[arg(short, long)]
        acl: Option<String>,
    },
    /// List the ACLs transitively referenced by the given ACLs
    References {
        policy: PathBuf,
        #[arg(required = true)]
        acls: Vec<String>,
    },
    /// Compile the firewall rules of a bridge network
    Firewall { policy: PathBuf, network: String },
}

#[derive(Serialize)]
struct ValidationReport {
    acl: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct CompileReport {
    acl: String,
    port_group: String,
    #[serde(flatten)]
    compiled: CompiledAcl,
    /// Network-relative rules as applied to each OVN network's port group.
    networks: serde_json::Map<String, serde_json::Value>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AclOrchConfig> {
    let Some(path) = path else {
        return Ok(AclOrchConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn load_policy(path: &Path) -> Result<PolicyDocument> {
    let doc = PolicyDocument::load(path)?;
    info!(
        "Loaded policy {} ({} ACLs, {} networks)",
        path.display(),
        doc.acls.len(),
        doc.networks.len()
    );
    Ok(doc)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    debug!("Using config {:?}", config);

    match args.command {
        Command::Validate { policy } => {
            let doc = load_policy(&policy)?;
            let reports: Vec<ValidationReport> = doc
                .acls
                .iter()
                .map(|acl| {
                    let result = doc.validated_acl(acl);
                    ValidationReport {
                        acl: acl.name.clone(),
                        valid: result.is_ok(),
                        error: result.err().map(|e| e.to_string()),
                    }
                })
                .collect();

            print_json(&reports)?;
            if reports.iter().all(|r| r.valid) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Compile { policy, acl } => {
            let doc = load_policy(&policy)?;
            let acls: Vec<&Acl> = match &acl {
                Some(name) => match doc.acl(name) {
                    Some(acl) => vec![acl],
                    None => bail!("ACL {:?} not found in policy", name),
                },
                None => doc.acls.iter().collect(),
            };

            let reports = acls
                .into_iter()
                .map(|acl| compile_report(&doc, acl, &config))
                .collect::<Result<Vec<_>>>()?;

            print_json(&reports)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::References { policy, acls } => {
            let doc = load_policy(&policy)?;
            let lookup = doc.acl_map();

            let mut roots = Vec::with_capacity(acls.len());
            for name in &acls {
                match doc.acl(name) {
                    Some(acl) => roots.push(acl),
                    None => bail!("ACL {:?} not found in policy", name),
                }
            }

            let referenced = resolve_references(&roots, &lookup).await?;
            print_json(&json!({ "acls": acls, "referenced": referenced }))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Firewall { policy, network } => {
            let doc = load_policy(&policy)?;
            let network = doc.network(&network)?;
            if network.network_type != NetworkType::Bridge {
                bail!(
                    "Network {:?} is of type {:?}, firewall rules only apply to bridge networks",
                    network.name,
                    network.network_type.to_string()
                );
            }

            let rules =
                compile_firewall_rules(network, &doc.acl_map(), config.firewall_default_action)
                    .await?;
            print_json(&json!({ "network": network.name, "rules": rules }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn compile_report(doc: &PolicyDocument, acl: &Acl, config: &AclOrchConfig) -> Result<CompileReport> {
    let acl = doc
        .validated_acl(acl)
        .with_context(|| format!("Invalid ACL {:?}", acl.name))?;
    let port_group = acl_port_group(acl.id);
    let compiled = compile_acl(&acl, &port_group, &doc.id_table(), &doc.peer_targets(), config)
        .with_context(|| format!("Failed compiling ACL {:?}", acl.name))?;

    let mut networks = serde_json::Map::new();
    for network in &doc.networks {
        let uses_acl = network.acl_names().contains(&acl.name.as_str());
        if network.network_type != NetworkType::Ovn || !uses_acl {
            continue;
        }

        let substitutions = network_substitutions(network.id);
        let rules: Vec<_> = compiled
            .network_rules
            .iter()
            .map(|rule| rule.substituted(&substitutions))
            .collect();
        networks.insert(
            acl_network_port_group(acl.id, network.id).to_string(),
            serde_json::to_value(rules)?,
        );
    }

    Ok(CompileReport {
        acl: acl.name.clone(),
        port_group: port_group.to_string(),
        compiled,
        networks,
    })
}
