//! alfred-cli - chat with an OpenAI-compatible model from the terminal
//!
//! Usage:
//!     alfred-cli [OPTIONS] [PROMPT]...
//!
//! Without a prompt, reads one message per line from stdin and keeps the
//! conversation for the rest of the session.
//!
//! Environment Variables:
//!     OPENAI_API_KEY: API key (required unless --api-key is given)
//!     ALFRED_MODEL: Model name (default: gpt-4o)
//!     ALFRED_BASE_URL: API base URL (default: https://api.openai.com/v1)

use std::io::Write;
use std::time::Duration;

use alfred::{
    ChatCompletionClient, ClientConfig, HttpClientConfig, LlmError, Message, RequestOptions,
};
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub const CLI_NAME: &str = "alfred-cli";

/// Chat with an OpenAI-compatible model
#[derive(Parser, Debug)]
#[command(name = CLI_NAME, version)]
#[command(about = "Chat with an OpenAI-compatible model")]
struct Cli {
    /// Model name
    #[arg(long, env = "ALFRED_MODEL")]
    model: Option<String>,

    /// API base URL
    #[arg(long, env = "ALFRED_BASE_URL")]
    base_url: Option<String>,

    /// API key (defaults to OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// System prompt placed before the conversation
    #[arg(short, long)]
    system: Option<String>,

    /// Wait for the full reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Per-reply timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Retries on rate limits and server errors
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Prompt to send; starts an interactive session when omitted
    prompt: Vec<String>,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new().with_http_config(HttpClientConfig {
            max_retries: self.retries,
            ..HttpClientConfig::default()
        });
        if let Some(ref key) = self.api_key {
            config = config.with_api_key(key);
        }
        if let Some(ref model) = self.model {
            config = config.with_model(model);
        }
        if let Some(ref base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        config
    }

    fn request_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ChatCompletionClient::new(cli.client_config())
        .context("Failed to configure the chat client")?;

    let mut history = Vec::new();
    if let Some(ref system) = cli.system {
        history.push(Message::system(system));
    }

    if !cli.prompt.is_empty() {
        history.push(Message::user(cli.prompt.join(" ")));
        reply(&client, &cli, &history).await?;
        return Ok(());
    }

    eprintln!("{CLI_NAME} ({}). Ctrl-C or Ctrl-D to quit.", client.model());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = next_prompt(&mut lines, interrupted()).await? else {
            eprintln!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        history.push(Message::user(line));
        match reply(&client, &cli, &history).await {
            Ok(Some(answer)) => history.push(Message::assistant(answer)),
            Ok(None) => {}
            Err(e) => {
                eprintln!("error: {e:#}");
                // Drop the unanswered turn so the next one starts cleanly.
                history.pop();
            }
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be observed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Next input line, or `None` at end of input or on interrupt.
async fn next_prompt<R, S>(
    lines: &mut Lines<R>,
    interrupt: S,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

/// Drive `work` to completion, cancelling `token` if `interrupt` fires first.
async fn run_interruptible<F, S>(
    work: F,
    token: &CancellationToken,
    interrupt: S,
) -> F::Output
where
    F: Future,
    S: Future<Output = ()>,
{
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => output,
        _ = interrupt => {
            token.cancel();
            work.await
        }
    }
}

/// Print one reply to stdout and return its full text.
async fn reply(
    client: &ChatCompletionClient,
    cli: &Cli,
    history: &[Message],
) -> Result<Option<String>> {
    let token = CancellationToken::new();
    let options = cli.request_options().with_cancellation(token.clone());

    let work = async {
        if cli.no_stream {
            buffered_reply(client, history, options).await
        } else {
            stream_reply(client, history, options).await
        }
    };

    match run_interruptible(work, &token, interrupted()).await {
        Err(LlmError::Cancelled) => {
            eprintln!("(cancelled)");
            Ok(None)
        }
        other => Ok(other?),
    }
}

async fn buffered_reply(
    client: &ChatCompletionClient,
    history: &[Message],
    options: RequestOptions,
) -> Result<Option<String>, LlmError> {
    let answer = client.chat_with(history, options).await?;
    match answer {
        Some(ref text) => println!("{text}"),
        None => eprintln!("(no content)"),
    }
    Ok(answer)
}

async fn stream_reply(
    client: &ChatCompletionClient,
    history: &[Message],
    options: RequestOptions,
) -> Result<Option<String>, LlmError> {
    let mut stream = client.stream_chat_with(history, options).await?;
    let mut text = String::new();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                print!("{chunk}");
                stdout.flush().ok();
                text.push_str(&chunk);
            }
            Err(LlmError::Cancelled) => {
                println!();
                eprintln!("(cancelled)");
                return Ok(keep_partial(text));
            }
            Err(e) => {
                println!();
                return Err(e);
            }
        }
    }
    println!();

    Ok(keep_partial(text))
}

fn keep_partial(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}
