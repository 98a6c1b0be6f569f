//! Command-line interface for chatflow.
//!
//! Provides commands for validating configuration, listing tenants, and
//! driving a conversation locally against mock providers.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::{ConsoleTransport, ScriptedLlm, StaticLedger, StaticPaymentLinks};
use crate::config::ChatflowConfig;
use crate::domain::{DebtInvoice, Domain, InboundEvent, TenantContext};
use crate::engine::{NodeServices, StateMachine};
use crate::flows;
use crate::idempotency::IdempotencyService;
use crate::nlu::IntentDetector;
use crate::router::{DomainRouter, RouterSettings, TranscriptLogger};
use crate::store::{
    InMemoryTenantStore, JsonlConversationStore, TenantCache, TenantFile, TenantStore,
    YamlTenantStore,
};

/// chatflow - Multi-tenant conversational workflow orchestrator
#[derive(Parser, Debug)]
#[command(name = "chatflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate tenants and domain graphs, then exit
    Check {
        /// Tenants file (defaults to the configured path)
        #[arg(short, long)]
        tenants: Option<PathBuf>,
    },

    /// List configured tenants
    Tenants {
        /// Tenants file (defaults to the configured path)
        #[arg(short, long)]
        tenants: Option<PathBuf>,
    },

    /// Drive a conversation from stdin against mock providers
    Simulate {
        /// Tenant key to simulate as
        #[arg(short, long, default_value = "demo-clinic")]
        tenant: String,

        /// Channel id of the simulated user
        #[arg(short, long, default_value = "5215550001")]
        channel: String,

        /// Tenants file (built-in demo tenants when omitted)
        #[arg(long)]
        tenants_file: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = ChatflowConfig::load()?;

        match self.command {
            Commands::Check { tenants } => check(&config, tenants),
            Commands::Tenants { tenants } => list_tenants(&config, tenants),
            Commands::Simulate {
                tenant,
                channel,
                tenants_file,
            } => simulate(&config, tenant, channel, tenants_file).await,
        }
    }
}

fn tenants_path(config: &ChatflowConfig, flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| config.tenants_file.clone())
        .context("No tenants file configured; pass --tenants or set paths.tenants")
}

fn check(config: &ChatflowConfig, tenants: Option<PathBuf>) -> Result<()> {
    let registry = flows::build_registry().context("Domain graph validation failed")?;
    for domain in [Domain::Medical, Domain::Pharmacy] {
        println!(
            "graph {}: {} nodes, entry '{}'",
            domain.as_str(),
            registry.node_names(domain).len(),
            registry.entry(domain)?
        );
    }

    match tenants_path(config, tenants) {
        Ok(path) => {
            let file = TenantFile::from_file(&path)?;
            println!("tenants: {} ok ({})", file.tenants.len(), path.display());
        }
        Err(_) => println!("tenants: no file configured, skipped"),
    }

    println!("ok");
    Ok(())
}

fn list_tenants(config: &ChatflowConfig, tenants: Option<PathBuf>) -> Result<()> {
    let path = tenants_path(config, tenants)?;
    let file = TenantFile::from_file(&path)?;

    for tenant in &file.tenants {
        println!(
            "{}\t{}\t{}",
            tenant.tenant_id,
            tenant.domain.as_str(),
            if tenant.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

/// Demo tenants used when no tenants file is given
fn demo_tenants() -> InMemoryTenantStore {
    InMemoryTenantStore::new()
        .with_tenant(TenantContext::new("demo-clinic", Domain::Medical))
        .with_tenant(TenantContext::new("demo-pharmacy", Domain::Pharmacy))
}

/// Demo ledger so the pharmacy flow has something to find
fn demo_ledger() -> StaticLedger {
    StaticLedger::new()
        .with_invoice(DebtInvoice {
            reference: "INV-1001".into(),
            balance: Decimal::new(125050, 2),
            currency: "MXN".into(),
            due_date: None,
        })
        .with_invoice(DebtInvoice {
            reference: "INV-2002".into(),
            balance: Decimal::new(39900, 2),
            currency: "MXN".into(),
            due_date: None,
        })
}

async fn simulate(
    config: &ChatflowConfig,
    tenant: String,
    channel: String,
    tenants_file: Option<PathBuf>,
) -> Result<()> {
    let tenants: Arc<dyn TenantStore> = match tenants_file {
        Some(path) => Arc::new(TenantCache::new(
            Arc::new(YamlTenantStore::from_file(&path)?),
            Duration::from_secs(60),
        )),
        None => Arc::new(demo_tenants()),
    };

    let resilience = Arc::new(config.resilience.build());
    let registry = Arc::new(flows::build_registry()?);
    let services = Arc::new(
        NodeServices::new(resilience.clone())
            .with_payment(Arc::new(StaticPaymentLinks::default()))
            .with_ledger(Arc::new(demo_ledger())),
    );
    let detector = IntentDetector::new(
        Some(Arc::new(ScriptedLlm::always("none"))),
        resilience.clone(),
    );

    let conversations = Arc::new(JsonlConversationStore::open(config.conversations_dir()).await?);
    let transcripts = TranscriptLogger::open(config.transcripts_dir()).await?;

    let router = DomainRouter::new(
        tenants,
        conversations,
        Arc::new(IdempotencyService::new(Duration::from_secs(
            config.idempotency.ttl_secs,
        ))),
        detector,
        StateMachine::new(registry, services),
        resilience,
        RouterSettings::default(),
    )
    .with_transport(Arc::new(ConsoleTransport))
    .with_transcripts(transcripts);

    println!("Simulating tenant '{}' as channel '{}'. Ctrl-D or 'exit' to quit.", tenant, channel);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        let event = InboundEvent::text(&tenant, &channel, Uuid::new_v4().to_string(), text);
        match router.handle(event).await {
            Ok(_) => {}
            Err(err) => eprintln!("error: {err}"),
        }
    }

    Ok(())
}
