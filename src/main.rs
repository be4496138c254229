//! CLI entry point for `mailintake`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailintake::config::{self, Config};
use mailintake::export::attachment::export_all_attachments;
use mailintake::ingest::{IngestReport, Ingestor};
use mailintake::persist::JsonRepository;
use mailintake::sanitize::HtmlSanitizer;
use mailintake::store::DirObjectStore;
use mailintake::{Email, MailParser, ParserOptions};

#[derive(Parser)]
#[command(
    name = "mailintake",
    version,
    about = "Parse raw internet mail into structured records and ingest mailboxes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one message file and print its fields
    Parse {
        path: PathBuf,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the attachments of one message file to a directory
    Attachments {
        path: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Move messages from the object store into the repository
    Ingest {
        /// Mailbox key prefixes, e.g. `alice/`
        #[arg(required = true, value_name = "PREFIX")]
        prefixes: Vec<String>,
        /// Object store root directory
        #[arg(long, env = "MAILINTAKE_STORE", value_name = "DIR")]
        store: Option<PathBuf>,
        /// Repository directory
        #[arg(long, env = "MAILINTAKE_DATA", value_name = "DIR")]
        data: Option<PathBuf>,
        /// Keep source objects after ingesting them
        #[arg(long)]
        keep: bool,
        /// Store HTML bodies without sanitizing them
        #[arg(long)]
        no_sanitize: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Parse { path, json } => cmd_parse(&path, json, &config),
        Commands::Attachments { path, output } => cmd_attachments(&path, &output, &config),
        Commands::Ingest {
            prefixes,
            store,
            data,
            keep,
            no_sanitize,
        } => {
            let store_dir = store.unwrap_or_else(|| config::object_dir(&config));
            let data_dir = data.unwrap_or_else(|| config::data_dir(&config));
            let delete = config.ingest.delete_after_ingest && !keep;
            let sanitize = config.ingest.sanitize_html && !no_sanitize;
            cmd_ingest(&prefixes, &store_dir, &data_dir, delete, sanitize, &config)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailintake.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailintake", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Parse a message file with the configured limits.
fn parse_file(path: &Path, config: &Config) -> anyhow::Result<Email> {
    let file = std::fs::File::open(path)
        .map_err(|e| mailintake::IngestError::io(path, e))?;
    let parser = MailParser::new(ParserOptions::from(&config.parser));
    let email = parser
        .parse_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Cannot parse {}", path.display()))?;
    Ok(email)
}

fn cmd_parse(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let start = Instant::now();
    let email = parse_file(path, config)?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&email)?);
    } else {
        print_email_table(path, &email, elapsed);
    }
    Ok(())
}

fn cmd_attachments(path: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    let email = parse_file(path, config)?;

    if !email.has_attachments() {
        println!("  No attachments found.");
        return Ok(());
    }

    let paths = export_all_attachments(&email, output)?;
    for p in &paths {
        println!("  {}", p.display());
    }
    println!(
        "  Extracted {} of {} attachment(s) to {}",
        paths.len(),
        email.attachments.len(),
        output.display()
    );
    Ok(())
}

fn cmd_ingest(
    prefixes: &[String],
    store_dir: &Path,
    data_dir: &Path,
    delete: bool,
    sanitize: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let store = DirObjectStore::new(store_dir);
    let repository = JsonRepository::open(data_dir)
        .with_context(|| format!("Cannot open repository in {}", data_dir.display()))?;
    let sanitizer = HtmlSanitizer::new();

    let mut ingestor = Ingestor::new(&store, &repository)
        .with_parser(MailParser::new(ParserOptions::from(&config.parser)))
        .with_attachment_prefix(config.storage.attachment_prefix.clone())
        .delete_after_ingest(delete);
    if sanitize {
        ingestor = ingestor.with_sanitizer(&sanitizer);
    }

    let pb = ProgressBar::new(prefixes.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Ingesting [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let progress = |prefix: &str| {
        pb.set_message(prefix.to_string());
        pb.inc(1);
    };
    let results = ingestor.ingest_mailboxes(prefixes, Some(&progress));
    pb.finish_and_clear();

    let mut total = IngestReport::default();
    let mut broken = 0usize;
    println!();
    for (prefix, result) in prefixes.iter().zip(results) {
        match result {
            Ok(report) => {
                println!(
                    "  {:<24} {:>5} stored  {:>5} failed  {:>5} attachments",
                    prefix, report.stored, report.failed, report.attachments
                );
                total.listed += report.listed;
                total.stored += report.stored;
                total.failed += report.failed;
                total.attachments += report.attachments;
            }
            Err(e) => {
                eprintln!("  {prefix:<24} error: {e}");
                broken += 1;
            }
        }
    }
    println!();
    println!(
        "  {} message(s) stored, {} failed, {} attachment(s) in {:.2?}",
        total.stored,
        total.failed,
        total.attachments,
        start.elapsed()
    );

    if broken > 0 {
        anyhow::bail!("{broken} mailbox(es) could not be listed");
    }
    Ok(())
}

/// Print a parsed message in a human-readable table.
fn print_email_table(path: &Path, email: &Email, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<14} {}", "File:", path.display());
    println!("  {:<14} {}", "From:", email.from_address);
    if email.from_display_name != email.from_address {
        println!("  {:<14} {}", "Name:", email.from_display_name);
    }
    println!("  {:<14} {}", "To:", email.to.join(", "));
    println!("  {:<14} {}", "Cc:", email.cc.join(", "));
    println!("  {:<14} {}", "Subject:", email.subject);
    println!("  {:<14} {}", "Received:", email.received.to_rfc2822());
    println!(
        "  {:<14} spam={} virus={}",
        "Flags:", email.is_spam, email.is_virus
    );
    println!(
        "  {:<14} {}",
        "Plain text:",
        format_size(email.plain_text.len(), BINARY)
    );
    println!(
        "  {:<14} {}",
        "HTML:",
        format_size(email.formatted_text.len(), BINARY)
    );
    println!("  {:<14} {:.2?}", "Parse time:", elapsed);

    if email.has_attachments() {
        println!();
        println!("  Attachments:");
        for att in &email.attachments {
            let name = if att.file_name.is_empty() {
                "(unnamed)"
            } else {
                att.file_name.as_str()
            };
            println!(
                "    {:>10}  {:<32} {}",
                format_size(att.size(), BINARY),
                att.content_type,
                name
            );
        }
    }

    if !email.plain_text.is_empty() {
        println!();
        for line in email.plain_text.lines().take(20) {
            println!("  | {line}");
        }
    }
    println!();
}
