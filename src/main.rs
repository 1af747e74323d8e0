//! ulogview: inspect ULog flight logs and extract typed series
//!
//! Loads a whole log (optionally gzip-compressed) and prints its schemas,
//! metadata, or the values of one field across every logged sample.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use ulogview::domain::TIMESTAMP_FIELD;
use ulogview::{load_log_file, LoadConfig, ParsedLog, PrimitiveKind, Property};

#[derive(Parser)]
#[command(name = "ulogview")]
#[command(about = "Decode ULog flight logs into typed time series")]
#[command(version)]
struct Cli {
    /// Log parser diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Refuse logs larger than this (decompressed) size
    #[arg(long, global = true, default_value = "1024")]
    max_size_mib: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a log: header, logged types, info, problems
    Info {
        /// Path to a .ulg or .ulg.gz file
        file: PathBuf,

        /// Output format: table, json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// List types, or print one type's field tree with offsets
    Schema {
        /// Path to a .ulg or .ulg.gz file
        file: PathBuf,

        /// Type to describe (lists all types if omitted)
        type_name: Option<String>,
    },
    /// Print one field from every sample of a type
    Read {
        /// Path to a .ulg or .ulg.gz file
        file: PathBuf,

        /// Logged type, e.g. vehicle_local_position
        type_name: String,

        /// Dotted field path, e.g. x or q[0] or waypoints[1].lat
        path: String,

        /// Only samples from this instance of a multi-instance type
        #[arg(short, long)]
        instance: Option<u8>,

        /// Output format: table, csv, json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Print console messages logged during the flight
    Messages {
        /// Path to a .ulg or .ulg.gz file
        file: PathBuf,
    },
    /// Print parameter values
    Params {
        /// Path to a .ulg or .ulg.gz file
        file: PathBuf,

        /// Output format: table, csv, json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(file: &Path, config: &LoadConfig) -> Result<ParsedLog> {
    if !file.exists() {
        bail!("Log not found: {}", file.display());
    }
    load_log_file(file, config).with_context(|| format!("Failed to load {}", file.display()))
}

fn run_info(log: &ParsedLog, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&log.summary())?);
        return Ok(());
    }

    let summary = log.summary();
    println!("ULog version:  {}", summary.version);
    println!("Start time:    {} us", summary.start_timestamp_us);
    println!("Parameters:    {}", summary.parameter_count);
    println!("Log messages:  {}", summary.log_line_count);
    println!(
        "Dropouts:      {} ({} ms)",
        summary.dropout_count, summary.dropout_ms
    );
    println!("Stream end:    {}", summary.stream_end);
    println!();

    let headers = ["type", "samples", "instances", "bytes"].map(String::from);
    let rows: Vec<Vec<String>> = summary
        .types
        .iter()
        .map(|t| {
            let instances: Vec<String> = t.instances.iter().map(u8::to_string).collect();
            vec![
                t.name.to_string(),
                t.samples.to_string(),
                instances.join(","),
                t.byte_count
                    .map_or("unresolved".to_string(), |n| n.to_string()),
            ]
        })
        .collect();
    print_table(&headers, &rows);

    if !summary.info.is_empty() {
        println!();
        for (key, value) in summary.info {
            println!("{key}: {value}");
        }
    }

    if !summary.diagnostics.is_empty() {
        eprintln!();
        for diagnostic in summary.diagnostics {
            eprintln!("Warning: {diagnostic}");
        }
        if summary.suppressed_diagnostics > 0 {
            eprintln!(
                "Warning: {} more problems not shown",
                summary.suppressed_diagnostics
            );
        }
    }
    Ok(())
}

fn run_schema(log: &ParsedLog, type_name: Option<&str>) -> Result<()> {
    match type_name {
        Some(name) => print!("{}", log.schema_description(name)?),
        None => {
            for name in log.types() {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn run_read(
    log: &ParsedLog,
    type_name: &str,
    path: &str,
    instance: Option<u8>,
    format: &str,
) -> Result<()> {
    let mut reader = log.series(type_name)?;
    if let Some(id) = instance {
        reader = reader.instance(id);
    }
    let resolved = reader.resolve(path)?;
    let has_timestamp = matches!(
        log.resolve(type_name, TIMESTAMP_FIELD).map(|r| r.leaf),
        Ok(Property::Builtin(PrimitiveKind::U64))
    );

    let mut headers = Vec::new();
    if has_timestamp {
        headers.push(TIMESTAMP_FIELD.to_string());
    }
    match &resolved.leaf {
        Property::Builtin(_) => headers.push(path.to_string()),
        Property::BuiltinArray(PrimitiveKind::Char, _) => headers.push(path.to_string()),
        Property::BuiltinArray(_, count) => {
            headers.extend((0..*count).map(|i| format!("{path}[{i}]")));
        }
        Property::Composite(_) | Property::CompositeArray(..) => {
            bail!(
                "{type_name}.{path} is a nested {}; read one of its fields instead",
                resolved.leaf.type_label()
            );
        }
    }

    let rows = reader.map_samples(|r, i| {
        let mut row = Vec::with_capacity(headers.len());
        if has_timestamp {
            row.push(Value::from(r.value_at::<u64>(i, TIMESTAMP_FIELD)?));
        }
        match &resolved.leaf {
            Property::BuiltinArray(PrimitiveKind::Char, _) => {
                let text = r.text_at(i, path)?;
                row.push(Value::String(text.trim_end_matches('\0').to_string()));
            }
            Property::BuiltinArray(..) => {
                for v in r.decoded_array_at(i, path)? {
                    row.push(serde_json::to_value(v).unwrap_or(Value::Null));
                }
            }
            _ => row.push(serde_json::to_value(r.decoded_at(i, path)?).unwrap_or(Value::Null)),
        }
        Ok(row)
    })?;

    print_rows(&headers, &rows, format)?;
    eprintln!("\n{} samples", rows.len());
    Ok(())
}

fn run_messages(log: &ParsedLog) -> Result<()> {
    let lines = &log.metadata().log_lines;
    if lines.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    for line in lines {
        let secs = line.timestamp_us as f64 / 1_000_000.0;
        println!("[{secs:>12.6}] {:<9} {}", line.level.as_str(), line.message);
    }
    Ok(())
}

fn run_params(log: &ParsedLog, format: &str) -> Result<()> {
    let headers = ["name", "value"].map(String::from);
    let rows: Vec<Vec<Value>> = log
        .metadata()
        .parameters
        .iter()
        .map(|(name, value)| {
            vec![
                Value::String(name.clone()),
                serde_json::to_value(value).unwrap_or(Value::Null),
            ]
        })
        .collect();
    print_rows(&headers, &rows, format)
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_rows(headers: &[String], rows: &[Vec<Value>], format: &str) -> Result<()> {
    match format {
        "csv" => {
            let mut writer = csv::Writer::from_writer(std::io::stdout().lock());
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(row.iter().map(cell))?;
            }
            writer.flush()?;
        }
        "json" => {
            let json_rows: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let obj: serde_json::Map<String, Value> = headers
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    Value::Object(obj)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json_rows)?);
        }
        _ => {
            let rows: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(cell).collect())
                .collect();
            print_table(headers, &rows);
        }
    }
    Ok(())
}

const MAX_COLUMN_WIDTH: usize = 50;

fn print_table(headers: &[String], rows: &[Vec<String>]) {
    if rows.is_empty() {
        println!("(no results)");
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (i, val) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(val.chars().count());
            }
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_COLUMN_WIDTH);
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{h:w$}"))
        .collect();
    println!("{}", header_line.join(" | "));

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", sep.join("-+-"));

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, &width)| {
                let truncated = if v.chars().count() > width && width > 3 {
                    let head: String = v.chars().take(width - 3).collect();
                    format!("{head}...")
                } else {
                    v.clone()
                };
                format!("{truncated:width$}")
            })
            .collect();
        println!("{}", row_line.join(" | "));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LoadConfig {
        max_log_bytes: cli.max_size_mib.saturating_mul(1024 * 1024),
        ..LoadConfig::default()
    };

    match cli.command {
        Commands::Info { file, format } => run_info(&load(&file, &config)?, &format),
        Commands::Schema { file, type_name } => {
            run_schema(&load(&file, &config)?, type_name.as_deref())
        }
        Commands::Read {
            file,
            type_name,
            path,
            instance,
            format,
        } => run_read(&load(&file, &config)?, &type_name, &path, instance, &format),
        Commands::Messages { file } => run_messages(&load(&file, &config)?),
        Commands::Params { file, format } => run_params(&load(&file, &config)?, &format),
    }
}
