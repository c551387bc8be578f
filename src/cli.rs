//! # Command-Line Interface
//!
//! The command tree mirrors the load disciplines and search strategies:
//!
//! ```bash
//! loadbench <protocol> <throughput|concurrency> <fixed|constraints> [flags] <values…>
//!
//! # one throughput test per value
//! loadbench dns throughput fixed -t 192.0.2.53 -d 30s 1000 2000 4000
//!
//! # adaptive breakpoint search with a latency ceiling
//! loadbench http throughput constraints -t example.com \
//!     -c "MAX(latency) < 30" -g ^100 1000
//!
//! # bounded-concurrency soak
//! loadbench udp concurrency fixed -t 192.0.2.7 -i payloads.txt 64
//! ```
//!
//! Common flags are global, so they may appear before or after the
//! subcommands. Test values are trailing positionals: a list for
//! `fixed`, a single starting value for `constraints`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::builder::styling::{AnsiColor, Styles};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::constraint::Constraint;
use crate::growth::Growth;
use crate::intervals::Distribution;
use crate::metrics::MetricParser;
use crate::options::{Options, OutputFormat};

/// Help message styling, matching clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser, Debug)]
#[command(
    name = "loadbench",
    author,
    version,
    about = "A multi-protocol load generator with adaptive breakpoint search",
    styles = styles()
)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub protocol: Protocol,
}

/// Flags shared by every protocol and test mode.
#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    /// The endpoint under test (host or host:port, protocol-specific)
    #[arg(short = 't', long, global = true)]
    pub target: Option<String>,

    /// Single test duration (e.g. "30s", "5m")
    #[arg(short = 'd', long, global = true, default_value = "1m", value_parser = parse_duration)]
    pub duration: Duration,

    /// Per-request timeout
    #[arg(short = 'w', long, global = true, default_value = "1s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Capacity of the event bus and the request stream
    #[arg(short = 'b', long, global = true, default_value_t = crate::defaults::BUFFER)]
    pub buffer: usize,

    /// Latency unit for histograms and the latency metric
    #[arg(short = 'u', long, global = true, default_value = "1ms", value_parser = parse_duration)]
    pub unit: Duration,

    /// Inter-arrival distribution for throughput tests
    /// (uniform|exponential, prefixes accepted)
    #[arg(short = 'D', long = "dist", global = true, default_value = "uniform", value_parser = parse_distribution)]
    pub distribution: Distribution,

    /// Input file with one request per line; stdin when omitted
    #[arg(short = 'i', long, global = true)]
    pub input: Option<PathBuf>,

    /// Skip collecting and printing the latency histogram
    #[arg(long = "nostats", global = true)]
    pub no_stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Rendering of logs and summaries
    #[arg(short = 'f', long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub format: LogFormat,

    /// Detailed log output file; logs go to stderr when omitted
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,
}

/// Output rendering for logs and end-of-test summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl From<LogFormat> for OutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Text => OutputFormat::Text,
            LogFormat::Json => OutputFormat::Json,
        }
    }
}

/// The protocol drives which tester and input format are used.
#[derive(Subcommand, Debug)]
pub enum Protocol {
    /// Load test a DNS server (input lines: "Domain QType")
    Dns {
        /// Prefix question names with a unique label to bypass caches
        #[arg(short = 'r', long, global = true)]
        randomize: bool,

        #[command(subcommand)]
        mode: Mode,
    },
    /// Load test an HTTP endpoint (input lines: "GET /path" or
    /// "POST /path form=data")
    Http {
        /// Send requests over https
        #[arg(long, global = true)]
        ssl: bool,

        #[command(subcommand)]
        mode: Mode,
    },
    /// Load test a raw UDP service (input lines: "Port Base64Payload")
    Udp {
        #[command(subcommand)]
        mode: Mode,
    },
}

/// The load discipline.
#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Drive a target rate in queries per second, unbounded concurrency
    Throughput {
        #[command(subcommand)]
        search: Search,
    },
    /// Keep a fixed number of requests in flight, unbounded rate
    Concurrency {
        #[command(subcommand)]
        search: Search,
    },
}

impl Mode {
    pub fn search(&self) -> &Search {
        match self {
            Mode::Throughput { search } | Mode::Concurrency { search } => search,
        }
    }
}

/// The search strategy across tests.
#[derive(Subcommand, Debug)]
pub enum Search {
    /// Run one test per explicit load value
    Fixed(FixedArgs),
    /// Adapt the load between tests until a constraint stops the search
    Constraints(ConstraintsArgs),
}

#[derive(Args, Debug)]
pub struct FixedArgs {
    /// Load values, one test per value, in order
    #[arg(required = true)]
    pub tests: Vec<u64>,
}

#[derive(Args, Debug)]
pub struct ConstraintsArgs {
    /// Starting load value for the search
    pub start: u64,

    /// Constraint, e.g. "MAX(latency) < 30" (repeatable, comma-separable)
    #[arg(short = 'c', long = "constraints", value_delimiter = ',')]
    pub constraints: Vec<String>,

    /// Growth strategy: +N linear, %F percentage, ^N exponential
    #[arg(short = 'g', long, default_value = "%100", value_parser = parse_growth)]
    pub growth: Growth,
}

impl CommonArgs {
    /// Builds the controller options for one run, parsing constraint
    /// expressions through `parsers` and letting their metrics install
    /// recorders. All configuration errors surface here, before any
    /// test starts.
    pub fn options<R, S>(
        &self,
        search: &Search,
        parsers: &[MetricParser<R, S>],
    ) -> anyhow::Result<Options<R, S>>
    where
        R: Send + 'static,
        S: Send + 'static,
    {
        let target = self
            .target
            .clone()
            .ok_or_else(|| anyhow!("a target is required (-t)"))?;

        let mut options = Options::new(target);
        options.duration = self.duration;
        options.timeout = self.timeout;
        options.buffer = self.buffer;
        options.unit = self.unit;
        options.distribution = self.distribution;
        options.no_stats = self.no_stats;
        options.input = self.input.clone();
        options.format = self.format.into();

        match search {
            Search::Fixed(args) => {
                options.tests = args.tests.clone();
                options.start = args.tests[0];
            }
            Search::Constraints(args) => {
                options.start = args.start;
                options.tests = vec![args.start];
                options.growth = args.growth.clone();
                for expression in &args.constraints {
                    let mut constraint = Constraint::parse(expression, parsers)?;
                    constraint.metric.setup(&mut options);
                    options.constraints.push(constraint);
                }
            }
        }
        Ok(options)
    }
}

/// Parses durations like "500ms", "10s", "5m" or "1h"; a bare number
/// means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (number, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid number in duration: {number}"))?;
    if number < 0.0 {
        return Err("duration cannot be negative".to_string());
    }

    let duration = match unit {
        "ms" => Duration::from_millis(number as u64),
        "s" => Duration::from_secs(number as u64),
        "m" => Duration::from_secs((number * 60.0) as u64),
        "h" => Duration::from_secs((number * 3600.0) as u64),
        _ => return Err(format!("invalid duration unit: {unit}")),
    };
    Ok(duration)
}

/// Parses a distribution name, accepting unambiguous prefixes.
fn parse_distribution(value: &str) -> Result<Distribution, String> {
    const CHOICES: [(&str, Distribution); 2] = [
        ("uniform", Distribution::Uniform),
        ("exponential", Distribution::Exponential),
    ];

    let matches: Vec<_> = CHOICES
        .iter()
        .filter(|(name, _)| name.starts_with(value))
        .collect();
    match matches.as_slice() {
        [(_, distribution)] => Ok(*distribution),
        [] => Err(format!(
            "distribution must be one of uniform, exponential; got {value:?}"
        )),
        _ => Err(format!("ambiguous distribution {value:?}")),
    }
}

fn parse_growth(value: &str) -> Result<Growth, String> {
    value.parse().map_err(|err: crate::growth::ParseGrowthError| err.to_string())
}
