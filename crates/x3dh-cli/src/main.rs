//! x3dh CLI - drive the key agreement from the command line
//!
//! Keys, bundles and initial messages are exchanged as JSON files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use x3dh_core::config::DEFAULT_INFO;
use x3dh_core::{
    Curve, Curve25519, InitialMessage, KeyPair, PreKeyStore, ProtocolConfig,
    ProtocolConfigBuilder, SharedSecret, SignedBundle, X3dh,
};

/// x3dh - asynchronous key agreement
#[derive(Parser)]
#[command(name = "x3dh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Protocol name mixed into the key derivation; both sides must match
    #[arg(long, env = "X3DH_INFO", default_value = DEFAULT_INFO, global = true)]
    info: String,

    /// Refuse bundles without a one-time pre-key
    #[arg(long, global = true)]
    require_one_time: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh X25519 key pair
    Keygen,

    /// Create responder keys and publish a pre-key bundle
    Publish {
        /// Where to write the private key material
        #[arg(long)]
        keys: PathBuf,
        /// Number of one-time pre-keys to create
        #[arg(long, default_value = "10")]
        one_time: u32,
        /// Write the bundle here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Derive a secret from a published bundle
    Initiate {
        /// Bundle JSON published by the responder
        #[arg(long)]
        bundle: PathBuf,
        /// Identity key pair JSON (a fresh one is generated if omitted)
        #[arg(long)]
        identity: Option<PathBuf>,
        /// Write the initial message here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Derive the secret from an initiator's message
    Respond {
        /// Private key material written by `publish`
        #[arg(long)]
        keys: PathBuf,
        /// Initial message JSON
        #[arg(long)]
        message: PathBuf,
    },

    /// Run a complete exchange in-process
    Demo,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = ProtocolConfigBuilder::new()
        .info(cli.info)
        .require_one_time_pre_key(cli.require_one_time)
        .build()
        .context("Invalid protocol configuration")?;

    match cli.command {
        Commands::Keygen => cmd_keygen()?,
        Commands::Publish {
            keys,
            one_time,
            out,
        } => {
            let published = cmd_publish(&keys, one_time)?;
            emit(&published, out.as_deref())?;
            eprintln!("✓ Keys written to {}", keys.display());
        }
        Commands::Initiate {
            bundle,
            identity,
            out,
        } => {
            let (message, secret) = cmd_initiate(&config, &bundle, identity.as_deref())?;
            report_initiate(
                &message,
                &secret,
                out.as_deref(),
                &mut io::stdout().lock(),
                &mut io::stderr().lock(),
            )?;
        }
        Commands::Respond { keys, message } => {
            let secret = cmd_respond(&config, &keys, &message)?;
            println!("Shared secret: {}", secret.to_hex());
        }
        Commands::Demo => cmd_demo(&config)?,
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write to `path` if given, otherwise print to stdout
fn emit<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn cmd_keygen() -> Result<()> {
    let pair = Curve25519::from_os_rng().generate_key_pair()?;
    println!("{}", serde_json::to_string_pretty(&pair)?);
    Ok(())
}

fn cmd_publish(keys_path: &Path, one_time: u32) -> Result<SignedBundle> {
    if keys_path.exists() {
        anyhow::bail!(
            "{} already exists. Refusing to overwrite private keys.",
            keys_path.display()
        );
    }

    let curve = Curve25519::from_os_rng();
    let store = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, one_time)?;
    let bundle = store.bundle()?;
    write_json(keys_path, &store)?;

    tracing::info!(
        identity = %bundle.fingerprint(),
        one_time,
        "Published pre-key bundle"
    );
    Ok(bundle)
}

fn cmd_initiate(
    config: &ProtocolConfig,
    bundle_path: &Path,
    identity_path: Option<&Path>,
) -> Result<(InitialMessage, SharedSecret)> {
    let bundle: SignedBundle = read_json(bundle_path)?;
    eprintln!("Remote identity: {}", bundle.fingerprint());
    let curve = Curve25519::from_os_rng();
    let identity: KeyPair = match identity_path {
        Some(path) => read_json(path)?,
        None => curve.generate_key_pair()?,
    };

    let engine = X3dh::<_>::with_config(curve, config.clone(), identity)?;
    let init = engine
        .calculate_secret(&bundle)
        .context("Key agreement with the bundle failed")?;
    let message = InitialMessage::for_bundle(engine.identity_key(), &init, &bundle)?;

    Ok((message, init.shared_secret))
}

/// Message JSON goes to `out` or stdout; the secret always goes to `log` so
/// stdout can be redirected straight into a message file.
fn report_initiate(
    message: &InitialMessage,
    secret: &SharedSecret,
    out: Option<&Path>,
    stdout: &mut impl Write,
    log: &mut impl Write,
) -> Result<()> {
    match out {
        Some(path) => write_json(path, message)?,
        None => writeln!(stdout, "{}", serde_json::to_string_pretty(message)?)?,
    }
    writeln!(log, "Shared secret: {}", secret.to_hex())?;
    Ok(())
}

fn cmd_respond(config: &ProtocolConfig, keys_path: &Path, message_path: &Path) -> Result<SharedSecret> {
    let mut store: PreKeyStore = read_json(keys_path)?;
    let message: InitialMessage = read_json(message_path)?;

    let engine = X3dh::<_>::with_config(
        Curve25519::from_os_rng(),
        config.clone(),
        store.identity().key_pair().clone(),
    )?;

    let secret = {
        let resolved = store
            .resolve(&message)
            .context("Initial message names keys we do not have")?;
        engine.secret_from_remote(&resolved.initialisation())?
    };

    // Persist the store without the consumed one-time pre-key
    write_json(keys_path, &store)?;
    Ok(secret)
}

fn cmd_demo(config: &ProtocolConfig) -> Result<()> {
    let curve = Curve25519::from_os_rng();
    let mut bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 1)?;
    let alice = X3dh::<_>::with_config(&curve, config.clone(), curve.generate_key_pair()?)?;
    let bob = X3dh::<_>::with_config(&curve, config.clone(), bob_keys.identity().key_pair().clone())?;

    println!("Protocol: {}", config.info);
    println!("Bob identity: {}", bob_keys.identity().public_identity().fingerprint());
    println!("Alice identity: {}", alice.identity_key().fingerprint());

    for round in 1..=2 {
        let bundle = bob_keys.bundle()?;
        let init = alice.calculate_secret(&bundle)?;
        let message = InitialMessage::for_bundle(alice.identity_key(), &init, &bundle)?;

        let resolved = bob_keys.resolve(&message)?;
        let bob_secret = bob.secret_from_remote(&resolved.initialisation())?;

        let status = if bob_secret == init.shared_secret { "✓ match" } else { "✗ MISMATCH" };
        println!(
            "\nRound {} ({} one-time pre-key)",
            round,
            if message.uses_one_time_pre_key() { "with" } else { "without" }
        );
        println!("  Alice: {}", init.shared_secret.to_hex());
        println!("  Bob:   {}", bob_secret.to_hex());
        println!("  {}", status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_initiate_respond() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.json");
        let bundle_path = dir.path().join("bundle.json");
        let message_path = dir.path().join("message.json");
        let config = ProtocolConfig::new("cli-test");

        let bundle = cmd_publish(&keys, 1).unwrap();
        write_json(&bundle_path, &bundle).unwrap();

        let (message, alice_secret) = cmd_initiate(&config, &bundle_path, None).unwrap();
        assert_eq!(message.one_time_pre_key_id, bundle.one_time_pre_key_id());
        write_json(&message_path, &message).unwrap();

        let bob_secret = cmd_respond(&config, &keys, &message_path).unwrap();
        assert_eq!(alice_secret, bob_secret);

        // The one-time pre-key is gone from the rewritten key file
        let store: PreKeyStore = read_json(&keys).unwrap();
        assert_eq!(store.remaining_one_time_pre_keys(), 0);
        assert!(cmd_respond(&config, &keys, &message_path).is_err());
    }

    #[test]
    fn test_initiate_stdout_is_only_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.json");
        let bundle_path = dir.path().join("bundle.json");
        let message_path = dir.path().join("message.json");
        let config = ProtocolConfig::default();

        write_json(&bundle_path, &cmd_publish(&keys, 1).unwrap()).unwrap();
        let (message, alice_secret) = cmd_initiate(&config, &bundle_path, None).unwrap();

        let mut stdout = Vec::new();
        let mut log = Vec::new();
        report_initiate(&message, &alice_secret, None, &mut stdout, &mut log).unwrap();

        // What a shell redirect would capture must feed straight into respond
        fs::write(&message_path, &stdout).unwrap();
        let parsed: InitialMessage = read_json(&message_path).unwrap();
        assert_eq!(parsed, message);
        assert!(String::from_utf8(log).unwrap().contains(&alice_secret.to_hex()));

        let bob_secret = cmd_respond(&config, &keys, &message_path).unwrap();
        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn test_publish_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.json");
        cmd_publish(&keys, 0).unwrap();
        assert!(cmd_publish(&keys, 0).is_err());
    }

    #[test]
    fn test_mismatched_info_disagrees() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.json");
        let bundle_path = dir.path().join("bundle.json");
        let message_path = dir.path().join("message.json");

        write_json(&bundle_path, &cmd_publish(&keys, 0).unwrap()).unwrap();
        let (message, alice_secret) =
            cmd_initiate(&ProtocolConfig::new("one"), &bundle_path, None).unwrap();
        write_json(&message_path, &message).unwrap();

        let bob_secret = cmd_respond(&ProtocolConfig::new("two"), &keys, &message_path).unwrap();
        assert_ne!(alice_secret, bob_secret);
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
