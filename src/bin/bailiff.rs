//! bailiff CLI: sealed case-document envelopes from the command line.
//!
//! Usage:
//!   bailiff keygen  --dir <DIR> [--name <NAME>]
//!   bailiff key-id  --key <PUB.pem>
//!   bailiff seal    --recipient <PUB.pem>... [--legacy] --in <FILE> --out <ENVELOPE.json>
//!   bailiff open    --dir <DIR> [--name <NAME>] --in <ENVELOPE.json> --out <FILE>
//!   bailiff inspect <ENVELOPE.json>

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bailiff_envelope::{Bailiff, Envelope, Identity, KeyId, PublicKey, Recipient};

#[derive(Parser)]
#[command(name = "bailiff", version, about = "RSA-OAEP + AES-256-GCM envelopes for case documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load or create an identity key pair and print its key id
    Keygen {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = "tribunal")]
        name: String,
    },
    /// Print the key id of a public key PEM
    KeyId {
        #[arg(long)]
        key: PathBuf,
    },
    /// Encrypt a file for one or more recipients
    Seal {
        #[arg(long = "recipient", required = true)]
        recipients: Vec<PathBuf>,
        /// Emit the single-recipient legacy shape
        #[arg(long)]
        legacy: bool,
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long = "out")]
        output: PathBuf,
    },
    /// Decrypt an envelope with a local identity
    Open {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = "tribunal")]
        name: String,
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long = "out")]
        output: PathBuf,
    },
    /// Show envelope metadata without decrypting
    Inspect { envelope: PathBuf },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Keygen { dir, name } => {
            let identity = Identity::load_or_generate(&dir, &name)?;
            eprintln!("identity in {}:", dir.display());
            eprintln!("  private key: {name}_private.pem (keep safe)");
            eprintln!("  public key:  {name}_public.pem");
            println!("{}", identity.key_id());
        }

        Command::KeyId { key } => {
            let pem = read_text(&key)?;
            PublicKey::from_pem(&pem).with_context(|| format!("{} is not a public key", key.display()))?;
            println!("{}", KeyId::for_public_key(&pem));
        }

        Command::Seal {
            recipients,
            legacy,
            input,
            output,
        } => {
            let plaintext = fs::read(&input).with_context(|| format!("read {}", input.display()))?;
            let envelope = if legacy {
                if recipients.len() != 1 {
                    bail!("--legacy takes exactly one --recipient");
                }
                let pk = PublicKey::from_pem(&read_text(&recipients[0])?)?;
                Bailiff::new().seal_legacy(&plaintext, &pk)?
            } else {
                let list = recipients
                    .iter()
                    .map(|p| Ok(Recipient::from_pem(&read_text(p)?)?))
                    .collect::<Result<Vec<_>>>()?;
                Bailiff::new().seal(&plaintext, &list)?
            };
            fs::write(&output, envelope.to_json()?).with_context(|| format!("write {}", output.display()))?;
            eprintln!(
                "sealed {} -> {} ({} recipient(s), digest {})",
                input.display(),
                output.display(),
                envelope.wrapped_keys.len(),
                envelope.content_digest
            );
        }

        Command::Open {
            dir,
            name,
            input,
            output,
        } => {
            let identity = Identity::load(&dir, &name)?;
            let envelope = Envelope::from_json(&fs::read(&input).with_context(|| format!("read {}", input.display()))?)?;
            let doc = Bailiff::new().open(&envelope, &identity)?;
            fs::write(&output, doc.plaintext.as_slice())
                .with_context(|| format!("write {}", output.display()))?;

            if !doc.verified {
                eprintln!("WARNING: content digest mismatch; do not trust {}", output.display());
                eprintln!("  expected: {}", doc.expected_digest);
                eprintln!("  computed: {}", doc.computed_digest);
                return Ok(ExitCode::from(2));
            }
            eprintln!("opened {} -> {} (digest verified)", input.display(), output.display());
        }

        Command::Inspect { envelope } => {
            let env = Envelope::from_json(&fs::read(&envelope).with_context(|| format!("read {}", envelope.display()))?)?;
            println!("{}", serde_json::to_string_pretty(&env.summary())?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_text(path: &PathBuf) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
