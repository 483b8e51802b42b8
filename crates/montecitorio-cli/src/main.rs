use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use montecitorio::pipeline::{ImportConfig, Importer};
use montecitorio::scraper::WebScraper;
use montecitorio::site::{DEFAULT_LEGISLATURE, SiteConfig};
use montecitorio::store::open_store;
use montecitorio::types::{House, ReferenceCode};
use montecitorio::utils::YearMonth;
use montecitorio::writer::write_json;

const DB_ENV: &str = "MONTECITORIO_DB";
const DEFAULT_DB: &str = "montecitorio.db";

#[derive(Parser)]
#[command(name = "montecitorio")]
#[command(about = "A camera.it roll-call votation scraper and importer", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        short = 'v',
        long = "verbosity",
        global = true,
        value_parser = clap::value_parser!(u8).range(0..=3),
        help = "Verbosity 0-3 (error, warn, info, debug); overrides --log-level"
    )]
    verbosity: Option<u8>,

    #[arg(
        long,
        value_parser = parse_house,
        default_value = "C",
        global = true,
        help = "Chamber to scrape (C or S)"
    )]
    house: House,

    #[arg(
        long,
        default_value_t = DEFAULT_LEGISLATURE,
        global = true,
        help = "Legislature number"
    )]
    legislature: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sittings published on the monthly summary pages
    Sittings {
        #[arg(
            long,
            value_name = "YYYY-MM",
            value_parser = parse_year_month,
            conflicts_with = "months_back",
            help = "Single month to list"
        )]
        month: Option<YearMonth>,

        #[arg(
            long,
            default_value_t = 1,
            help = "Months to go back from the current one"
        )]
        months_back: u32,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// List the votations of the sitting held on a given day, following every listing page
    Votations {
        #[arg(
            value_name = "YYYY-MM-DD",
            help = "Day of the sitting",
            value_parser = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string()),
        )]
        date: NaiveDate,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Fetch the detail of a single votation: tallies, result and member votes
    Detail {
        #[arg(
            value_name = "REF",
            value_parser = parse_reference,
            help = "Reference code, <sitting>_<votation>"
        )]
        reference: ReferenceCode,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Read sittings, votations and details of recent months and dump them as JSON
    Read {
        #[arg(
            long,
            default_value_t = 1,
            help = "Months to go back from the current one"
        )]
        months_back: u32,

        #[arg(long, help = "Write to this file instead of standard output")]
        output_file: Option<PathBuf>,
    },
    /// Incrementally import recent sittings and votations into a sqlite database
    Import {
        #[arg(
            long,
            default_value_t = 1,
            help = "Months to go back from the current one"
        )]
        months_back: u32,

        #[arg(long, help = "Database path [env: MONTECITORIO_DB] [default: montecitorio.db]")]
        db: Option<PathBuf>,

        #[arg(long, help = "Fetch and extract everything but write nothing")]
        dry_run: bool,

        #[arg(long, help = "Record failures and continue with the next unit")]
        keep_going: bool,

        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..=16),
            help = "Votation detail pages fetched at once"
        )]
        concurrency: u16,
    },
}

fn parse_house(s: &str) -> Result<House, String> {
    House::from_str(s).map_err(|e| e.to_string())
}

fn parse_year_month(s: &str) -> Result<YearMonth, String> {
    YearMonth::from_str(s).map_err(|e| e.to_string())
}

fn parse_reference(s: &str) -> Result<ReferenceCode, String> {
    ReferenceCode::from_str(s).map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = ImportConfig {
        log_level: match cli.verbosity {
            Some(verbosity) => ImportConfig::level_for_verbosity(verbosity),
            None => cli.log_level.clone().into(),
        },
        ..ImportConfig::default()
    };
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .init();

    let site = SiteConfig::for_house(cli.house, cli.legislature).unwrap_or_else(|e| {
        log::error!("{}", e);
        process::exit(1);
    });

    let scraper = WebScraper::new(site).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Sittings {
            month,
            months_back,
            format,
        } => {
            let window = match month {
                Some(ym) => vec![ym],
                None => YearMonth::recent(months_back),
            };

            let sittings = scraper.list_sittings_in(&window).await.unwrap_or_else(|e| {
                log::error!("Error listing sittings: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&sittings),
                OutputFormat::Text => {
                    if sittings.is_empty() {
                        println!("No sittings to display.");
                    } else {
                        for (i, sitting) in sittings.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, sitting);
                        }
                    }
                }
            }
        }

        Commands::Votations { date, format } => {
            let votations = scraper.list_votations(date).await.unwrap_or_else(|e| {
                log::error!("Error listing votations of {}: {}", date, e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&votations),
                OutputFormat::Text => {
                    if votations.is_empty() {
                        println!("No votations in the sitting of {}.", date);
                    } else {
                        for (i, votation) in votations.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, votation);
                        }
                    }
                }
            }
        }

        Commands::Detail { reference, format } => {
            log::info!("Fetching votation detail {}...", reference);

            let detail = scraper
                .get_votation_details(&reference)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Error fetching votation detail: {}", e);
                    process::exit(1);
                });

            match format {
                OutputFormat::Json => serialize_json(&detail),
                OutputFormat::Text => println!("{}", detail),
            }
        }

        Commands::Read {
            months_back,
            output_file,
        } => {
            let sittings = scraper.read_recent(months_back).await.unwrap_or_else(|e| {
                log::error!("Error reading votations: {}", e);
                process::exit(1);
            });

            if let Err(e) = write_json(&sittings, output_file.as_deref()) {
                log::error!("Error writing JSON: {}", e);
                process::exit(1);
            }
        }

        Commands::Import {
            months_back,
            db,
            dry_run,
            keep_going,
            concurrency,
        } => {
            let db = db
                .or_else(|| std::env::var_os(DB_ENV).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

            let store = open_store(&db, dry_run).unwrap_or_else(|e| {
                log::error!("Error opening {}: {}", db.display(), e);
                process::exit(1);
            });

            let scraper = scraper.with_detail_concurrency(concurrency.into());
            let config = ImportConfig {
                dry_run,
                keep_going,
                ..config
            };

            let mut importer = Importer::new(&scraper, store, config);
            let report = importer.run_recent(months_back).await.unwrap_or_else(|e| {
                log::error!("Import aborted: {}", e);
                process::exit(1);
            });

            print!("{}", report);
            if !report.is_success() {
                process::exit(1);
            }
        }
    }
}
