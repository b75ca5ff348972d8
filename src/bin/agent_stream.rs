use agent_stream::api::logging::init_logging;
use agent_stream::api::mock_client::LoopbackTransport;
use agent_stream::api::{
    HistoryClient, HttpTransport, StreamConsumer, StreamHandler, StreamOutcome, StreamTransport,
    WireFormat,
};
use agent_stream::config::Config;
use agent_stream::error::StreamError;
use agent_stream::server::{
    stream_agent_response, MemoryEventStore, SimulatedAgent, SimulationOptions, TranscriptStore,
};
use agent_stream::state::{ChunkOutcome, EventAssembler, EventHistory};
use agent_stream::types::{Chunk, Event, HistoryQuery, StreamRequest};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Parser, Debug)]
#[command(name = "agent-stream", about = "Stream agent events over NDJSON or MessagePack")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message to the configured agent endpoint and print the reply.
    Send {
        message: String,
    },
    /// Print stored history as JSON, oldest first.
    History {
        /// Number of pages to fetch.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Run producer and consumer in-process against the demo transcript.
    Simulate {
        #[arg(default_value = "How fast is example.com?")]
        message: String,

        /// Wire format: ndjson or msgpack.
        #[arg(long)]
        format: Option<WireFormat>,

        /// Fail the simulated upstream after this many deltas.
        #[arg(long)]
        fail_after: Option<usize>,
    },
}

/// Prints text as it streams and tool calls as they start and finish.
struct TerminalPrinter {
    assembler: EventAssembler,
}

impl TerminalPrinter {
    fn new() -> Self {
        Self {
            assembler: EventAssembler::new(),
        }
    }
}

impl StreamHandler for TerminalPrinter {
    fn on_event_chunk(&mut self, chunk: Chunk) {
        let mut stdout = std::io::stdout().lock();
        match (&chunk, self.assembler.add_chunk(chunk.clone())) {
            (Chunk::MessageDelta { delta }, _) => {
                let _ = write!(stdout, "{delta}");
            }
            (Chunk::ToolStart { .. }, ChunkOutcome::Started(index)) => {
                if let Some(Event::Tool(tool)) = self.assembler.events().get(index) {
                    let _ = writeln!(stdout, "\n[tool] {} ({})", tool.tool_name, tool.id);
                }
            }
            (Chunk::ToolOutput { .. }, ChunkOutcome::Updated(index)) => {
                if let Some(Event::Tool(tool)) = self.assembler.events().get(index) {
                    let _ = writeln!(stdout, "[tool] {} <- {}", tool.input, tool.output);
                }
            }
            _ => {}
        }
        let _ = stdout.flush();
    }

    fn on_error(&mut self, error: &StreamError) {
        eprintln!("\nstream failed: {error}");
    }

    fn on_end(&mut self) {
        println!();
    }
}

async fn consume<T: StreamTransport + 'static>(
    consumer: StreamConsumer<T>,
    message: String,
) -> Result<StreamOutcome> {
    let handle = consumer.start(StreamRequest::new(message), TerminalPrinter::new());

    let cancel = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (_printer, outcome) = handle.finished().await?;
    interrupt.abort();

    if outcome == StreamOutcome::Aborted {
        eprintln!("aborted");
    }
    Ok(outcome)
}

async fn send(config: &Config, message: String) -> Result<()> {
    let consumer = StreamConsumer::new(HttpTransport::from_config(config))
        .with_fallback_format(config.wire_format);
    match consume(consumer, message).await? {
        StreamOutcome::Failed(error) => Err(anyhow!(error)),
        _ => Ok(()),
    }
}

async fn history(config: &Config, pages: usize) -> Result<()> {
    let client = HistoryClient::from_config(config);
    let mut history = EventHistory::new(config.page_size);
    for _ in 0..pages {
        if !history.has_next_page() {
            break;
        }
        history.fetch_next_page(&client).await?;
    }
    println!("{}", serde_json::to_string_pretty(&history.events())?);
    Ok(())
}

async fn simulate(
    config: &Config,
    message: String,
    format: Option<WireFormat>,
    fail_after: Option<usize>,
) -> Result<()> {
    let format = format.unwrap_or(config.wire_format);
    let store = Arc::new(MemoryEventStore::new());
    let options = SimulationOptions::default().with_fail_after(fail_after);
    let producers: Arc<Mutex<Vec<JoinHandle<Vec<Event>>>>> = Arc::new(Mutex::new(Vec::new()));

    let transport = {
        let store = Arc::clone(&store);
        let producers = Arc::clone(&producers);
        LoopbackTransport::new(move |request: &StreamRequest| {
            let sink: Arc<dyn TranscriptStore> = store.clone();
            let (body, task) = stream_agent_response(
                request.message.clone(),
                format,
                SimulatedAgent::demo(options),
                sink,
            );
            if let Ok(mut producers) = producers.lock() {
                producers.push(task);
            }
            body
        })
    };

    let outcome = consume(StreamConsumer::new(transport), message).await?;

    let pending: Vec<_> = match producers.lock() {
        Ok(mut producers) => producers.drain(..).collect(),
        Err(_) => Vec::new(),
    };
    for task in pending {
        task.await?;
    }

    let page = store.page(HistoryQuery::new(0, config.page_size))?;
    println!("{}", serde_json::to_string_pretty(&page)?);

    match outcome {
        StreamOutcome::Failed(error) => Err(anyhow!(error)),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = Config::load()?;
    config.validate()?;

    match args.command {
        Command::Send { message } => send(&config, message).await,
        Command::History { pages } => history(&config, pages).await,
        Command::Simulate {
            message,
            format,
            fail_after,
        } => simulate(&config, message, format, fail_after).await,
    }
}
