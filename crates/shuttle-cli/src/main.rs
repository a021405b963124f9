//! shuttle - queue ディレクトリを操作する CLI
//!
//! Usage:
//!   shuttle send --root R --queue Q --message-type T --body JSON [--header K=V]...
//!   shuttle inspect --root R --queue Q
//!   shuttle recover --root R --queue Q
//!   shuttle demo --config FILE

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shuttle_core::domain::{Headers, headers};
use shuttle_core::impls::TracingEventSink;
use shuttle_core::pipeline::IncomingContext;
use shuttle_core::ports::{IdGenerator, SystemClock, UlidGenerator};
use shuttle_core::store::check_message_id;
use shuttle_core::{
    Address, EndpointBuilder, EndpointConfig, Handler, Message, OutgoingMessage, PipelineError, QueueStore,
    RecoverySweeper,
};

#[derive(Parser, Debug)]
#[command(name = "shuttle")]
#[command(about = "Crash-safe local transactional queues")]
struct Args {
    /// Log filter (trace, debug, info, warn, error or a full directive)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver one message into a queue.
    Send {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        queue: String,
        #[arg(long)]
        message_type: String,
        /// Raw body, usually JSON.
        #[arg(long, default_value = "{}")]
        body: String,
        /// Extra header, repeatable.
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Message id; generated when omitted.
        #[arg(long, value_parser = parse_message_id)]
        id: Option<String>,
    },
    /// Print ready / pending / committed counts as JSON.
    Inspect {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        queue: String,
    },
    /// Resolve transactions left behind by a crashed process.
    Recover {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        queue: String,
    },
    /// Run a sample endpoint from a JSON config until its queue drains.
    Demo {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected K=V, got '{raw}'")),
    }
}

fn parse_message_id(raw: &str) -> Result<String, String> {
    check_message_id(raw).map_err(|e| e.to_string())?;
    Ok(raw.to_string())
}

fn store_at(root: &Path) -> QueueStore {
    QueueStore::new(
        root,
        Arc::new(UlidGenerator::new(SystemClock)),
        Arc::new(TracingEventSink),
    )
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).context("invalid --log-level")?)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Send {
            root,
            queue,
            message_type,
            body,
            headers: extra,
            id,
        } => {
            let store = store_at(&root);
            let id = id.unwrap_or_else(|| UlidGenerator::new(SystemClock).generate_message_id().to_string());

            let mut h = Headers::new();
            h.insert(headers::MESSAGE_TYPE.to_string(), message_type);
            h.extend(extra);
            let message = OutgoingMessage::new(id, h, body.into_bytes());

            let queue = Address::new(queue);
            store.deliver(&queue, &message).await?;
            info!(%queue, message_id = %message.message_id(), "Delivered");
        }
        Command::Inspect { root, queue } => {
            let counts = store_at(&root).counts(&Address::new(queue)).await?;
            print_json(&counts)?;
        }
        Command::Recover { root, queue } => {
            let report = RecoverySweeper::new(store_at(&root)).sweep(&Address::new(queue)).await?;
            print_json(&report)?;
        }
        Command::Demo { config, count } => demo(&config, count).await?,
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    name: String,
}

impl Message for Greet {
    const TYPE: &'static str = "demo.greet.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct Greeted {
    name: String,
}

impl Message for Greeted {
    const TYPE: &'static str = "demo.greeted.v1";
}

struct GreetHandler;

#[async_trait]
impl Handler<Greet> for GreetHandler {
    async fn handle(&self, message: Greet, ctx: &IncomingContext) -> Result<(), PipelineError> {
        if message.name.is_empty() {
            return Err(PipelineError::handler("nobody to greet"));
        }
        println!("Hello, {}!", message.name);
        ctx.send_local(&Greeted { name: message.name }).await
    }
}

struct GreetedHandler;

#[async_trait]
impl Handler<Greeted> for GreetedHandler {
    async fn handle(&self, message: Greeted, _ctx: &IncomingContext) -> Result<(), PipelineError> {
        info!(name = %message.name, "Greeted");
        Ok(())
    }
}

async fn demo(path: &Path, count: usize) -> anyhow::Result<()> {
    let config = EndpointConfig::from_json_file(path).await?;
    let endpoint = EndpointBuilder::new(config)
        .register::<Greet, _>(GreetHandler)?
        .register::<Greeted, _>(GreetedHandler)?
        .command::<Greet>()
        .expect_messages(&[Greet::TYPE, Greeted::TYPE])
        .build()?;

    let workers = endpoint.start().await?;
    for i in 0..count {
        endpoint.send_local(&Greet { name: format!("shuttle-{i}") }).await?;
    }
    // 空の name は失敗し続けて error queue に行く
    endpoint.send_local(&Greet { name: String::new() }).await?;

    let drained = async {
        loop {
            let mut busy = false;
            for queue in endpoint.input_queues() {
                let counts = endpoint.store().counts(queue).await?;
                busy |= counts.ready + counts.pending_transactions + counts.committed_transactions > 0;
            }
            if !busy {
                return Ok::<_, anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    tokio::select! {
        result = drained => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Received shutdown signal");
        }
    }
    workers.shutdown_and_join().await;

    let error_queue = endpoint.config().error_address();
    print_json(&endpoint.store().counts(&error_queue).await?)?;
    Ok(())
}
