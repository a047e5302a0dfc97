use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use sec_declarador::utils::FilingFilter;
use sec_declarador::{ClientConfig, Folio, SecClient};

#[derive(Parser)]
#[command(name = "sec-declarador")]
#[command(about = "Lists and downloads filings registered on the SEC e-declarador portal", long_about = None)]
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

    #[arg(long, env = "SEC_RUT", global = true, help = "RUT of the declarant")]
    rut: Option<String>,

    #[arg(
        long,
        env = "SEC_PASSWORD",
        hide_env_values = true,
        global = true,
        help = "Portal password"
    )]
    password: Option<String>,

    #[arg(long, global = true, help = "Override the portal base URL")]
    base_url: Option<String>,

    #[arg(
        long,
        default_value_t = 30,
        global = true,
        help = "Request timeout in seconds"
    )]
    timeout: u64,

    #[arg(
        long,
        global = true,
        help = "Do not check that the portal accepted the credentials"
    )]
    no_verify_login: bool,

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
    /// List every filing registered by the declarant
    List {
        #[arg(long, help = "Only filings of this kind (e.g. TE1)")]
        kind: Option<String>,

        #[arg(
            long,
            help = "Number of results to skip from the beginning",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        offset: Option<u16>,

        #[arg(
            long,
            help = "Maximum number of results to return",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        limit: Option<u16>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Show the detail page of a filing and its attachments
    Summary {
        #[arg(help = "Folio of the filing")]
        folio: Folio,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Download the HTML receipt and the signed PDF of a filing
    Certificate {
        #[arg(help = "Folio of the filing")]
        folio: Folio,

        #[arg(long, value_name = "PATH", help = "Where to write the HTML receipt")]
        html: Option<PathBuf>,

        #[arg(long, value_name = "PATH", help = "Where to write the PDF certificate")]
        pdf: Option<PathBuf>,
    },
    /// Download every attachment of a filing
    Attachments {
        #[arg(help = "Folio of the filing")]
        folio: Folio,

        #[arg(long, value_name = "DIR", default_value = ".", help = "Target directory")]
        dir: PathBuf,
    },
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

fn write_file(path: &Path, contents: &[u8]) {
    if let Err(e) = fs::write(path, contents) {
        log::error!("Error writing {}: {}", path.display(), e);
        process::exit(1);
    }
    log::info!("Wrote {} ({} bytes)", path.display(), contents.len());
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let (Some(rut), Some(password)) = (cli.rut, cli.password) else {
        log::error!("Credentials missing: pass --rut and --password or set SEC_RUT and SEC_PASSWORD");
        process::exit(1);
    };

    let mut config = ClientConfig {
        timeout: Duration::from_secs(cli.timeout),
        verify_login: !cli.no_verify_login,
        ..ClientConfig::default()
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let client = SecClient::with_config(config, &rut, &password).unwrap_or_else(|e| {
        log::error!("Error logging in: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::List {
            kind,
            offset,
            limit,
            format,
        } => {
            let filter = FilingFilter {
                kind,
                offset: offset.map(usize::from),
                limit: limit.map(usize::from),
            };
            let filter = filter.validate().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            let filings = filter
                .apply(client.filings())
                .collect::<Result<Vec<_>, _>>()
                .unwrap_or_else(|e| {
                    log::error!("Error fetching filings: {}", e);
                    process::exit(1);
                });

            match format {
                OutputFormat::Json => serialize_json(&filings),
                OutputFormat::Text => {
                    if filings.is_empty() {
                        println!("No filings to display.");
                    } else {
                        for (i, filing) in filings.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, filing);
                        }
                        println!("\nTotal: {}", filings.len());
                    }
                }
            }
        }

        Commands::Summary { folio, format } => {
            let summary = client.filing_summary(&folio).unwrap_or_else(|e| {
                log::error!("Error fetching summary of {}: {}", folio, e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&summary),
                OutputFormat::Text => print!("{}", summary),
            }
        }

        Commands::Certificate { folio, html, pdf } => {
            let certificates = client.filing_certificates(&folio).unwrap_or_else(|e| {
                log::error!("Error fetching certificates of {}: {}", folio, e);
                process::exit(1);
            });

            let html_path = html.unwrap_or_else(|| PathBuf::from(format!("{}.html", folio)));
            let pdf_path = pdf.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", folio)));
            write_file(&html_path, certificates.html.source().as_bytes());
            write_file(&pdf_path, &certificates.pdf);
        }

        Commands::Attachments { folio, dir } => {
            let summary = client.filing_summary(&folio).unwrap_or_else(|e| {
                log::error!("Error fetching summary of {}: {}", folio, e);
                process::exit(1);
            });

            if summary.attachments.is_empty() {
                println!("Filing {} has no attachments.", folio);
                return;
            }

            if let Err(e) = fs::create_dir_all(&dir) {
                log::error!("Error creating {}: {}", dir.display(), e);
                process::exit(1);
            }

            for attachment in &summary.attachments {
                let Some(file_name) = Path::new(&attachment.file_name).file_name() else {
                    log::warn!("Skipping attachment with unusable name '{}'", attachment.file_name);
                    continue;
                };
                match attachment.content() {
                    Ok(bytes) => write_file(&dir.join(file_name), bytes),
                    Err(e) => log::warn!("Failed to download {}: {}", attachment.file_name, e),
                }
            }
        }
    }
}
