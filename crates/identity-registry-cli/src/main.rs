//! Identity registry CLI — `idreg` command.
//!
//! Every invocation locks the registry snapshot, loads it, performs one
//! call through the dispatcher as `--caller`, and writes the snapshot back
//! if the call mutated state. The lock is held until the process exits, so
//! concurrent invocations against one store run one at a time.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};

use identity_registry::clock::micros_to_rfc3339;
use identity_registry::{
    DispatchError, Dispatcher, Operation, Principal, RegistryConfig, SnapshotLock, SnapshotStore,
    SystemClock, Value,
};

/// Requester used for reads when no caller is given.
const ANONYMOUS: &str = "anonymous";

// ── CLI structure ─────────────────────────────────────────────────────────────

/// Identity registry CLI: one identity record per principal.
#[derive(Parser, Debug)]
#[command(
    name = "idreg",
    about = "Identity registry CLI",
    version,
    long_about = "idreg — identity registry CLI\n\n\
                  Register, read, update and deactivate identity records.\n\
                  State is kept in a JSON snapshot (default: ~/.idreg/registry.json)."
)]
struct Cli {
    /// Principal issuing the call (falls back to $IDREG_CALLER)
    #[arg(long, global = true)]
    caller: Option<String>,

    /// Snapshot file (overrides $IDREG_HOME)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Contract name to address (overrides $IDREG_CONTRACT)
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register an identity for the caller
    Register {
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Replace the payload of the caller's own identity
    Update {
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Print the payload stored for a principal
    Get {
        /// Principal to look up
        target: String,

        /// Print the payload as base64 even if it is valid UTF-8
        #[arg(long)]
        base64: bool,
    },

    /// Print whether a principal's identity is active
    Active {
        /// Principal to look up
        target: String,
    },

    /// Deactivate an identity (caller must own it)
    Deactivate {
        /// Principal whose identity to deactivate
        target: String,
    },

    /// Show the full record for a principal
    Show {
        /// Principal to look up
        target: String,
    },

    /// List all registered identities
    List,
}

/// Exactly one payload source.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PayloadArgs {
    /// Payload as literal text
    #[arg(long)]
    data: Option<String>,

    /// Payload as standard base64
    #[arg(long)]
    base64: Option<String>,

    /// Read the payload from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl PayloadArgs {
    fn read(&self) -> Result<Vec<u8>> {
        if let Some(text) = &self.data {
            return Ok(text.as_bytes().to_vec());
        }
        if let Some(encoded) = &self.base64 {
            return STANDARD
                .decode(encoded.trim())
                .map_err(|e| anyhow!("invalid base64 payload: {e}"));
        }
        if let Some(path) = &self.file {
            return std::fs::read(path)
                .with_context(|| format!("failed to read payload file {}", path.display()));
        }
        Err(anyhow!("no payload given (use --data, --base64 or --file)"))
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A locked and loaded registry plus where to write it back.
struct Session {
    contract: String,
    store: SnapshotStore,
    dispatcher: Dispatcher,
    _lock: SnapshotLock,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = RegistryConfig::from_env();
        if let Some(contract) = &cli.contract {
            config.contract_name = contract.clone();
        }
        let path = cli.store.clone().unwrap_or_else(|| config.snapshot_path());
        let store = SnapshotStore::new(path);

        let lock = store
            .lock(SnapshotStore::LOCK_TIMEOUT)
            .with_context(|| format!("failed to lock {}", store.path().display()))?;
        let registry = store
            .load(Arc::new(SystemClock))
            .with_context(|| format!("failed to load registry from {}", store.path().display()))?;
        log::debug!(
            "opened {} with {} identities",
            store.path().display(),
            registry.len()
        );

        Ok(Self {
            contract: config.contract_name.clone(),
            dispatcher: Dispatcher::new(Arc::new(registry), &config),
            store,
            _lock: lock,
        })
    }

    /// Run one call; persist the snapshot after a successful mutation.
    fn invoke(&self, op: Operation, arg: Value, caller: &Principal) -> Result<Value> {
        let args = [arg];
        let value = if op.is_read_only() {
            self.dispatcher
                .call_read_only(&self.contract, op.name(), &args, caller)?
        } else {
            self.dispatcher
                .call_public(&self.contract, op.name(), &args, caller)?
        };

        if !op.is_read_only() {
            self.store
                .save(self.dispatcher.registry())
                .with_context(|| {
                    format!("failed to save registry to {}", self.store.path().display())
                })?;
        }

        Ok(value)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn raw_caller(cli: &Cli) -> Option<String> {
    cli.caller
        .clone()
        .or_else(|| std::env::var("IDREG_CALLER").ok())
}

fn caller_principal(cli: &Cli) -> Result<Principal> {
    let raw =
        raw_caller(cli).ok_or_else(|| anyhow!("this command needs --caller (or $IDREG_CALLER)"))?;
    Ok(Principal::parse(&raw)?)
}

/// Reads do not require a caller.
fn requester_principal(cli: &Cli) -> Result<Principal> {
    match raw_caller(cli) {
        Some(raw) => Ok(Principal::parse(&raw)?),
        None => Ok(Principal::new(ANONYMOUS)),
    }
}

fn target_principal(raw: &str) -> Result<Principal> {
    Ok(Principal::parse(raw)?)
}

fn render_payload(data: &[u8], force_base64: bool) -> String {
    match std::str::from_utf8(data) {
        Ok(text) if !force_base64 => text.to_string(),
        _ => STANDARD.encode(data),
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(&cli) {
        match e.downcast_ref::<DispatchError>() {
            Some(call_err) => eprintln!("error {}: {call_err}", call_err.code()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let session = Session::open(cli)?;

    match &cli.command {
        Commands::Register { payload } => cmd_register(&session, cli, payload),
        Commands::Update { payload } => cmd_update(&session, cli, payload),
        Commands::Get { target, base64 } => cmd_get(&session, cli, target, *base64),
        Commands::Active { target } => cmd_active(&session, cli, target),
        Commands::Deactivate { target } => cmd_deactivate(&session, cli, target),
        Commands::Show { target } => cmd_show(&session, target),
        Commands::List => cmd_list(&session, cli.verbose),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// `idreg register --caller P (--data T | --base64 B | --file F)`
fn cmd_register(session: &Session, cli: &Cli, payload: &PayloadArgs) -> Result<()> {
    let caller = caller_principal(cli)?;
    let data = payload.read()?;
    let size = data.len();

    session.invoke(Operation::RegisterIdentity, Value::Buffer(data), &caller)?;

    println!("Registered identity for {caller} ({size} bytes)");
    if cli.verbose {
        println!("  Store: {}", session.store.path().display());
    }
    Ok(())
}

/// `idreg update --caller P (--data T | --base64 B | --file F)`
fn cmd_update(session: &Session, cli: &Cli, payload: &PayloadArgs) -> Result<()> {
    let caller = caller_principal(cli)?;
    let data = payload.read()?;
    let size = data.len();

    session.invoke(Operation::UpdateIdentity, Value::Buffer(data), &caller)?;

    println!("Updated identity for {caller} ({size} bytes)");
    Ok(())
}

/// `idreg get TARGET [--base64]`
fn cmd_get(session: &Session, cli: &Cli, target: &str, force_base64: bool) -> Result<()> {
    let requester = requester_principal(cli)?;
    let target = target_principal(target)?;

    match session.invoke(Operation::GetIdentityData, Value::Principal(target), &requester)? {
        Value::Buffer(data) => {
            println!("{}", render_payload(&data, force_base64));
            Ok(())
        }
        other => Err(anyhow!("unexpected result type: {}", other.type_name())),
    }
}

/// `idreg active TARGET`
fn cmd_active(session: &Session, cli: &Cli, target: &str) -> Result<()> {
    let requester = requester_principal(cli)?;
    let target = target_principal(target)?;

    match session.invoke(Operation::IsIdentityActive, Value::Principal(target), &requester)? {
        Value::Bool(active) => {
            println!("{active}");
            Ok(())
        }
        other => Err(anyhow!("unexpected result type: {}", other.type_name())),
    }
}

/// `idreg deactivate --caller P TARGET`
fn cmd_deactivate(session: &Session, cli: &Cli, target: &str) -> Result<()> {
    let caller = caller_principal(cli)?;
    let target = target_principal(target)?;

    session.invoke(
        Operation::DeactivateIdentity,
        Value::Principal(target.clone()),
        &caller,
    )?;

    println!("Deactivated identity for {target}");
    Ok(())
}

/// `idreg show TARGET`
fn cmd_show(session: &Session, target: &str) -> Result<()> {
    let target = target_principal(target)?;
    let record = session
        .dispatcher
        .registry()
        .get_identity(&target)
        .map_err(DispatchError::from)?;

    println!("Identity: {}", record.owner);
    println!("  Active:      {}", record.active);
    println!("  Size:        {} bytes", record.data.len());
    println!("  SHA-256:     {}", record.data_digest());
    println!("  Registered:  {}", micros_to_rfc3339(record.registered_at));
    println!("  Updated:     {}", micros_to_rfc3339(record.updated_at));
    if let Some(at) = record.deactivated_at {
        println!("  Deactivated: {}", micros_to_rfc3339(at));
    }
    Ok(())
}

/// `idreg list`
fn cmd_list(session: &Session, verbose: bool) -> Result<()> {
    let records = session.dispatcher.registry().records();

    if records.is_empty() {
        println!("No identities registered.");
        return Ok(());
    }

    for record in &records {
        let status = if record.active { "active" } else { "inactive" };
        let digest = record.data_digest();
        println!(
            "{:<44} {:<8} {:>6} bytes  {}",
            record.owner,
            status,
            record.data.len(),
            &digest[..16]
        );
        if verbose {
            println!("    registered {}", micros_to_rfc3339(record.registered_at));
        }
    }
    println!("{} identities", records.len());
    Ok(())
}
