//! Console front-end: reads lines from stdin, prints received-message
//! summaries to stdout, and drives the single-context chat loop. All the
//! actual logic lives in the library - this binary only adapts stdin/stdout
//! to the loop's input/display seams.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, Level};

use udpchat::chat_loop::{ChatLoop, DisplaySink, InputSource};
use udpchat::config::ChatConfig;

#[derive(Parser)]
#[clap(name = "udpchat", about = "peer-to-peer UDP chat")]
struct Args {
    #[clap(long)]
    username: String,

    /// local UDP port to bind; 0 picks an ephemeral port
    #[clap(long)]
    port: u16,

    #[clap(long)]
    peer_ip: IpAddr,

    #[clap(long)]
    peer_port: u16,

    /// defaults to $HOSTNAME
    #[clap(long)]
    hostname: Option<String>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let hostname = args
        .hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());

    let config = ChatConfig::new(
        args.port,
        SocketAddr::new(args.peer_ip, args.peer_port),
        args.username,
        hostname,
    );

    let chat = ChatLoop::bind(&config, Arc::new(StdoutSink)).await?;

    println!("Chat started. Type your messages below.");
    chat.run(StdinSource::new()).await?;
    println!("Exiting.");
    Ok(())
}


struct StdoutSink;

#[async_trait]
impl DisplaySink for StdoutSink {
    async fn append_line(&self, line: String) {
        println!("{}", line);
    }
}


struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    fn new() -> StdinSource {
        StdinSource {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl InputSource for StdinSource {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                error!("error reading from stdin: {}", e);
                None
            }
        }
    }
}
