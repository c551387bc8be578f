//! # loadbench — Main Entry Point
//!
//! Wires the pieces together for one invocation:
//!
//! 1. Parse the command tree (`<protocol> <mode> <search> [flags] <values…>`).
//! 2. Initialise logging: a level filter driven by `-v`, rendered by the
//!    console formatter on stderr or appended to `-o` as text/JSON.
//! 3. Build the protocol tester, the input-backed request generator and
//!    the controller options.
//! 4. Hand everything to the search controller.
//!
//! Progress and diagnostics go to stderr; histograms and summaries go
//! to stdout, so redirecting stdout isolates results. Any error is
//! reported as a one-line `Error: <msg>` on stderr with exit code 1.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use loadbench::cli::{Cli, CommonArgs, LogFormat, Mode, Protocol, Search};
use loadbench::controller;
use loadbench::input::{self, RequestGenerator};
use loadbench::metrics::standard_metrics;
use loadbench::options::Options;
use loadbench::protocols::{dns, http, udp};
use loadbench::tester::Tester;

mod logging;
use logging::ConsoleFormatter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The guard must stay alive for the whole run; dropping it stops
    // the non-blocking log writer.
    let _guard = match init_logging(&cli.common) {
        Ok(guard) => guard,
        Err(err) => fail(err),
    };

    if let Err(err) = run(cli).await {
        fail(err);
    }
}

fn fail(err: anyhow::Error) -> ! {
    eprintln!("Error: {err:#}");
    std::process::exit(1);
}

/// Sets up the tracing subscriber: one layer, either on stderr with the
/// colorized console formatter or appended to the `-o` file, in text or
/// JSON per `-f`.
fn init_logging(
    common: &CommonArgs,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match common.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    match &common.output {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = match common.format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(level)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(level)
                    .boxed(),
            };
            tracing_subscriber::registry().with(layer).init();
            Ok(Some(guard))
        }
        None => {
            let layer = match common.format {
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(level)
                    .boxed(),
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .event_format(ConsoleFormatter)
                    .with_writer(std::io::stderr)
                    .with_filter(level)
                    .boxed(),
            };
            tracing_subscriber::registry().with(layer).init();
            Ok(None)
        }
    }
}

/// Builds the protocol plugin and dispatches to the controller.
async fn run(cli: Cli) -> Result<()> {
    let common = cli.common;
    match cli.protocol {
        Protocol::Dns { randomize, mode } => {
            let options = common.options::<dns::Query, dns::Answer>(
                mode.search(),
                &[standard_metrics::<dns::Query, dns::Answer>],
            )?;
            let generator = input::request_generator(
                common.input.as_deref(),
                dns::parse_query,
                dns::modifiers(randomize),
            )?;
            let tester = dns::DnsTester {
                target: options.target.clone(),
                timeout: options.timeout,
            };
            execute(tester, generator, options, mode).await
        }
        Protocol::Http { ssl, mode } => {
            let options = common.options::<http::HttpRequest, http::HttpResponse>(
                mode.search(),
                &[standard_metrics::<http::HttpRequest, http::HttpResponse>],
            )?;
            let generator = input::request_generator(
                common.input.as_deref(),
                http::transformer(ssl, &options.target),
                Vec::new(),
            )?;
            let tester = http::HttpTester::new(options.timeout);
            execute(tester, generator, options, mode).await
        }
        Protocol::Udp { mode } => {
            let options = common.options::<udp::Datagram, Vec<u8>>(
                mode.search(),
                &[standard_metrics::<udp::Datagram, Vec<u8>>],
            )?;
            let generator = input::request_generator(
                common.input.as_deref(),
                udp::parse_datagram,
                Vec::new(),
            )?;
            let tester = udp::UdpTester {
                target: options.target.clone(),
                timeout: options.timeout,
                validator: None,
            };
            execute(tester, generator, options, mode).await
        }
    }
}

async fn execute<T: Tester>(
    mut tester: T,
    generator: RequestGenerator<T::Request>,
    mut options: Options<T::Request, T::Response>,
    mode: Mode,
) -> Result<()> {
    match mode {
        Mode::Throughput {
            search: Search::Fixed(_),
        } => controller::load_test_throughput_fixed(&mut tester, &generator, &mut options).await,
        Mode::Throughput {
            search: Search::Constraints(_),
        } => {
            controller::load_test_throughput_constraints(&mut tester, &generator, &mut options)
                .await
        }
        Mode::Concurrency {
            search: Search::Fixed(_),
        } => controller::load_test_concurrency_fixed(&mut tester, &generator, &mut options).await,
        Mode::Concurrency {
            search: Search::Constraints(_),
        } => {
            controller::load_test_concurrency_constraints(&mut tester, &generator, &mut options)
                .await
        }
    }
}
