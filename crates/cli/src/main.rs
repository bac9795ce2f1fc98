mod cli;
mod config;

use chrono::Local;
use clap::Parser;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// Timestamp, level and module, without span context
struct SimpleFmt;

impl<S, N> FormatEvent<S, N> for SimpleFmt
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "{} ", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;

        let level = event.metadata().level();
        match *level {
            Level::ERROR => write!(writer, "ERROR ")?,
            Level::WARN => write!(writer, "WARN  ")?,
            Level::INFO => write!(writer, "INFO  ")?,
            Level::DEBUG => write!(writer, "DEBUG ")?,
            Level::TRACE => write!(writer, "TRACE ")?,
        }

        write!(writer, "[{}] ", event.metadata().target())?;

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout carries link URLs and results only.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(SimpleFmt)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = cli::Cli::parse();
    init_logging(&args.log_level)?;

    let config = config::Config::from_args(&args)?;
    cli::run(args.command, &config).await
}
