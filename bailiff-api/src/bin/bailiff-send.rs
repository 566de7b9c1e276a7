//! bailiff-send: seal a document for a receiver's active keys and submit it.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bailiff_api::config::{LogFormat, DEFAULT_RECEIVER_URL};
use bailiff_api::telemetry::init_tracing;
use bailiff_api::{ReceiverClient, SendMode};
use clap::Parser;

#[derive(Parser)]
#[command(name = "bailiff-send", version, about = "Submit a sealed case document")]
struct Cli {
    /// Receiver base URL
    #[arg(long, env = "BAILIFF_RECEIVER_URL", default_value = DEFAULT_RECEIVER_URL)]
    receiver: String,

    /// Case name recorded by the receiver
    #[arg(long)]
    case_name: String,

    /// Document to send
    #[arg(long)]
    file: PathBuf,

    /// File name to report; defaults to the name of --file
    #[arg(long)]
    file_name: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let document = std::fs::read(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let file_name = match cli.file_name {
        Some(name) => name,
        None => cli
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".into()),
    };

    let client = ReceiverClient::new(&cli.receiver)?;
    let report = client
        .send(&cli.case_name, &file_name, &document)
        .await
        .with_context(|| format!("sending to {}", cli.receiver))?;

    println!("case id:  {}", report.case_id);
    println!("digest:   {}", report.content_digest);
    match report.mode {
        SendMode::MultiRecipient { recipients } => {
            let ids: Vec<String> = recipients.iter().map(ToString::to_string).collect();
            println!("sealed for {} key(s): {}", ids.len(), ids.join(", "));
        }
        SendMode::Legacy { reason } => {
            println!("sealed with the receiver's single key ({reason})");
        }
    }
    Ok(())
}
