use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use texx_core::{CoreConfig, CoreError, Incoming, KeyGeneration, Messenger, SessionGate, SessionState, Transport};
use texx_proto::{ChatPayload, ConnectionContext, PeerId, TransportError};
use texx_store::{Direction, HistoryEntry};

mod demo;

#[derive(Parser)]
#[command(name = "texx")]
#[command(about = "End-to-end encrypted peer-to-peer chat, local account tools", long_about = None)]
struct Cli {
    /// Account directory (overrides TEXX_DATA_DIR and the platform default)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether an identity exists and the lockout state
    Status,

    /// Create the identity for this device
    Init {
        /// Handle in word-word form, e.g. alice-bee-cat
        #[arg(long)]
        handle: String,
    },

    /// Check the PIN
    Unlock,

    /// Print handle, fingerprint and the key-transfer frame
    Whoami,

    /// List stored contact keys
    Contacts,

    /// Feed one wire frame received from a peer ("-" reads stdin)
    Receive {
        #[arg(long)]
        from: String,
        frame: String,
    },

    /// Encrypt and log a message; the wire frame is printed to stdout
    Send {
        #[arg(long)]
        to: String,
        text: String,
    },

    /// Decrypted conversation with a peer
    History { peer: String },

    /// Irreversibly wipe identity, contacts and messages
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },

    /// Two throwaway accounts chatting over the in-memory network
    Demo,
}

/// Writes outgoing frames to stdout, one JSON line each, for the user to
/// carry to the peer.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, ctx: &ConnectionContext, payload: &ChatPayload) -> Result<(), TransportError> {
        let frame = payload.to_bytes().map_err(|e| TransportError::Other(e.to_string()))?;
        let line = String::from_utf8(frame).map_err(|e| TransportError::Other(e.to_string()))?;
        println!("{line}");
        tracing::debug!(to = %ctx.peer, token = %ctx.token, "frame written to stdout");
        Ok(())
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("texx=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    // The demo never touches the real account directory.
    if let Commands::Demo = cli.command {
        return demo::run().await;
    }

    let config = match &cli.data_dir {
        Some(dir) => CoreConfig::load_from(dir)?,
        None => CoreConfig::load()?,
    };
    let gate = SessionGate::open(config, Arc::new(StdoutTransport)).await?;

    match cli.command {
        Commands::Status => status(&gate),
        Commands::Init { handle } => init(&gate, &handle).await,
        Commands::Unlock => {
            let messenger = unlock(&gate).await?;
            println!("unlocked as {}", messenger.peer_id());
            Ok(())
        }
        Commands::Whoami => whoami(&gate).await,
        Commands::Contacts => contacts(&gate).await,
        Commands::Receive { from, frame } => receive(&gate, &from, &frame).await,
        Commands::Send { to, text } => send(&gate, &to, &text).await,
        Commands::History { peer } => history(&gate, &peer).await,
        Commands::DeleteAccount { yes } => delete_account(&gate, yes).await,
        Commands::Demo => demo::run().await,
    }
}

fn read_pin(prompt: &str) -> Result<String> {
    if let Ok(pin) = std::env::var("TEXX_PIN") {
        if !pin.is_empty() {
            return Ok(pin);
        }
    }
    rpassword::prompt_password(prompt).map_err(|e| anyhow!("PIN prompt: {e}"))
}

fn status(gate: &SessionGate) -> Result<()> {
    match gate.handle()? {
        Some(handle) => println!("handle:   {handle}"),
        None => println!("handle:   (not chosen)"),
    }
    match gate.state() {
        SessionState::HasVault => {
            match gate.store().vault.stored_public_key() {
                Ok(key) => println!("identity: present ({})", key.fingerprint()),
                Err(e) => println!("identity: present but unreadable ({e})"),
            }
            match gate.store().attempts.failures() {
                Ok(failures) => println!("failed unlocks: {failures}"),
                Err(e) => println!("failed unlocks: unreadable ({e}); the next wrong PIN wipes"),
            }
        }
        _ => println!("identity: none (run `texx init --handle <word-word>`)"),
    }
    Ok(())
}

async fn init(gate: &SessionGate, handle: &str) -> Result<()> {
    if gate.evaluate_needs_key_generation()? == KeyGeneration::Unlock {
        bail!("an identity already exists on this device");
    }
    let handle = gate.choose_handle(handle).await?;
    let pin = read_pin("Choose a PIN: ")?;
    if std::env::var("TEXX_PIN").is_err() {
        let again = read_pin("Repeat PIN: ")?;
        if again != pin {
            bail!("PINs do not match");
        }
    }
    let messenger = gate.submit_pin(&pin).await?;
    println!("created identity {handle}");
    println!("fingerprint: {}", messenger.fingerprint());
    Ok(())
}

async fn unlock(gate: &SessionGate) -> Result<Messenger> {
    if gate.evaluate_needs_key_generation()? == KeyGeneration::Create {
        bail!("no identity on this device (run `texx init`)");
    }
    match gate.submit_pin(&read_pin("PIN: ")?).await {
        Ok(messenger) => Ok(messenger),
        Err(CoreError::WrongPassphrase { attempts_left }) => {
            if attempts_left == 1 {
                eprintln!("warning: one more wrong PIN wipes this account");
            }
            Err(CoreError::WrongPassphrase { attempts_left }.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn whoami(gate: &SessionGate) -> Result<()> {
    let messenger = unlock(gate).await?;
    println!("handle:      {}", messenger.peer_id());
    println!("fingerprint: {}", messenger.fingerprint());
    let frame = ChatPayload::key(messenger.public_key()).to_bytes()?;
    println!("key frame:   {}", String::from_utf8(frame)?);
    Ok(())
}

async fn contacts(gate: &SessionGate) -> Result<()> {
    let messenger = unlock(gate).await?;
    for row in messenger.contacts().await? {
        let key = texx_crypto::PublicKeyBytes::from_b64(&row.public_key)?;
        println!("{:<24} {}  (updated {})", row.peer_id, key.fingerprint(), format_ms(row.updated_at));
    }
    Ok(())
}

async fn receive(gate: &SessionGate, from: &str, frame: &str) -> Result<()> {
    let peer = PeerId::parse(from)?;
    let frame = if frame == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        frame.to_string()
    };
    let messenger = unlock(gate).await?;
    let ctx = ConnectionContext::new(peer);

    match messenger.on_incoming(&ctx, frame.trim().as_bytes()).await? {
        Incoming::Text(delivered) => println!("[{}] {}: {}", format_ms(delivered.timestamp), delivered.peer, delivered.plaintext),
        Incoming::Deferred { queued } => println!("stored; key for {} unknown yet ({queued} waiting)", ctx.peer),
        Incoming::KeyStored { change, released, lost } => {
            println!("key for {}: {change:?}", ctx.peer);
            for delivered in released {
                println!("[{}] {}: {}", format_ms(delivered.timestamp), delivered.peer, delivered.plaintext);
            }
            if lost > 0 {
                eprintln!("{lost} queued messages were dropped");
            }
        }
        Incoming::Opened { .. } => {}
    }
    Ok(())
}

async fn send(gate: &SessionGate, to: &str, text: &str) -> Result<()> {
    let messenger = unlock(gate).await?;
    let ctx = ConnectionContext::new(PeerId::parse(to)?);
    messenger.send_text(&ctx, text).await?;
    Ok(())
}

async fn history(gate: &SessionGate, peer: &str) -> Result<()> {
    let messenger = unlock(gate).await?;
    let peer = PeerId::parse(peer)?;
    let (entries, failed) = messenger.history_report(&peer).await?;
    for entry in &entries {
        print_entry(&peer, messenger.peer_id(), entry);
    }
    if failed > 0 {
        eprintln!("{failed} messages could not be decrypted");
    }
    Ok(())
}

pub(crate) fn print_entry(peer: &PeerId, me: &PeerId, entry: &HistoryEntry) {
    let who = match entry.direction {
        Direction::Sent => me,
        Direction::Received => peer,
    };
    println!("[{}] {}: {}", format_ms(entry.timestamp), who, entry.plaintext);
}

async fn delete_account(gate: &SessionGate, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to wipe without --yes");
    }
    gate.delete_account().await?;
    println!("account deleted");
    Ok(())
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
