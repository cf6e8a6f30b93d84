use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use stripe_dispatch::Dispatcher;
use stripe_dispatch::application::registry::Registry;
use stripe_dispatch::domain::ports::StripeBackendBox;
use stripe_dispatch::domain::request::{API_BASE_KEY, DispatchInput, SECRET_KEY};
use stripe_dispatch::infrastructure::http::HttpBackend;
use stripe_dispatch::infrastructure::in_memory::InMemoryStripe;
use stripe_dispatch::interfaces::json::input_reader::InputReader;
use stripe_dispatch::interfaces::json::outcome_writer::OutcomeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// The live Stripe API
    Http,
    /// A local, deterministic emulator
    Memory,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dispatch input JSON file; reads stdin when omitted or `-`
    input: Option<PathBuf>,

    /// Stripe secret key, used when the input's env does not set one
    #[arg(long, env = SECRET_KEY, hide_env_values = true)]
    secret: Option<String>,

    /// Override the Stripe API base URL
    #[arg(long, env = API_BASE_KEY)]
    api_base: Option<String>,

    /// Where calls are sent
    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,

    /// Print every supported resource.method and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    if cli.list {
        writer.write_registry(Registry::standard()).into_diagnostic()?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut input = read_input(cli.input)?;
    // Values in the input's own env win over flags and process env.
    if let Some(secret) = cli.secret {
        input.env.entry(SECRET_KEY.to_string()).or_insert(Value::String(secret));
    }
    if let Some(api_base) = cli.api_base {
        input.env.entry(API_BASE_KEY.to_string()).or_insert(Value::String(api_base));
    }

    let backend: StripeBackendBox = match cli.backend {
        Backend::Http => Box::new(HttpBackend::from_env(&input.env)),
        Backend::Memory => Box::new(InMemoryStripe::new()),
    };

    let outcome = Dispatcher::new(backend).dispatch(input).await;
    writer.write_outcome(&outcome).into_diagnostic()?;

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_input(path: Option<PathBuf>) -> Result<DispatchInput> {
    let input = match path {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path).into_diagnostic()?;
            InputReader::new(file).read()?
        }
        _ => InputReader::new(io::stdin().lock()).read()?,
    };
    Ok(input)
}

fn init_tracing() {
    // Logs go to stderr; stdout carries only the outcome document.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}
