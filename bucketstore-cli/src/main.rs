/*!
Bucketstore CLI - command-line interface for the bucketstore data store.

Writes files to a Google Cloud Storage bucket under generated UIDs, reads
them back together with their metadata, and destroys them.
*/

use anyhow::{anyhow, Context};
use bucketstore_core::{
    generate_uid, Content, DataStore, DataStoreConfig, GcsStorageClient, MetaValue, Metadata,
    WriteOptions,
};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bucketstore")]
#[command(about = "CLI for the bucketstore data store")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bucket objects are stored in
    #[arg(short, long, global = true, env = "BUCKETSTORE_BUCKET")]
    bucket: Option<String>,

    /// Project used when the bucket has to be created
    #[arg(long, global = true, env = "GOOGLE_CLOUD_PROJECT", default_value = "")]
    project: String,

    /// Service account JSON keyfile
    #[arg(long, global = true, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    keyfile: Option<PathBuf>,

    /// Public domain objects are served from
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Prefix prepended to every storage key
    #[arg(long, global = true)]
    root_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its UID
    Write {
        /// File to upload
        file: PathBuf,
        /// Name used in the generated UID (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Store under this UID instead of generating one
        #[arg(short, long)]
        path: Option<String>,
        /// Metadata entry, KEY=VALUE (JSON scalars keep their type)
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
        /// Upload header, NAME=VALUE
        #[arg(long = "header", value_parser = parse_key_value)]
        headers: Vec<(String, String)>,
    },
    /// Fetch an object and show its metadata
    Read {
        /// Object UID
        uid: String,
        /// Write the content here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object
    Destroy {
        /// Object UID
        uid: String,
    },
    /// Print the public URL of an object
    Url {
        /// Object UID
        uid: String,
    },
    /// Generate a UID without storing anything
    Uid {
        /// Base name, last UID segment
        #[arg(default_value = "file")]
        name: String,
    },
}

#[derive(Tabled)]
struct MetadataRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Type")]
    kind: &'static str,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Commands::Uid { name } = &cli.command {
        println!("{}", generate_uid(name));
        return Ok(());
    }

    let config = create_store_config(&cli)?;

    match &cli.command {
        Commands::Url { uid } => {
            let store = DataStore::new(NoClient, config)?;
            let url = store
                .url_for(uid)
                .ok_or_else(|| anyhow!("No domain configured, pass --domain"))?;
            println!("{url}");
        }
        command => {
            let client = GcsStorageClient::from_config(&config)?;
            let store = DataStore::new(client, config)?;
            run_store_command(&store, command)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    // stdout carries object content
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn create_store_config(cli: &Cli) -> Result<DataStoreConfig, anyhow::Error> {
    let bucket = cli
        .bucket
        .clone()
        .ok_or_else(|| anyhow!("A bucket is required: pass --bucket or set BUCKETSTORE_BUCKET"))?;

    let mut config = DataStoreConfig::new(cli.project.clone(), bucket);
    config.keyfile = cli.keyfile.clone();
    config.domain = cli.domain.clone();
    config.root_path = cli.root_path.clone();
    config.validate()?;
    Ok(config)
}

fn run_store_command(
    store: &DataStore<GcsStorageClient>,
    command: &Commands,
) -> Result<(), anyhow::Error> {
    match command {
        Commands::Write {
            file,
            name,
            path,
            meta,
            headers,
        } => {
            let mut content = Content::from_file(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if let Some(name) = name {
                content.name = Some(name.clone());
            }
            for (key, value) in meta {
                content.meta.insert(key.clone(), parse_meta_value(value));
            }

            let mut opts = WriteOptions {
                path: path.clone(),
                ..Default::default()
            };
            for (header, value) in headers {
                opts = opts.with_header(header.clone(), value.clone());
            }

            let uid = store.write(&content, &opts)?;
            info!(uid = %uid, "Stored object");
            println!("{uid}");
            if let Some(url) = store.url_for(&uid) {
                println!("{url}");
            }
        }
        Commands::Read { uid, output } => {
            let (data, meta) = store.try_read(uid).map_err(|e| {
                error!("Failed to read {}: {}", uid, e);
                e
            })?;

            match output {
                Some(path) => {
                    std::fs::write(path, &data)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} to {}", format_size(data.len() as u64), path.display());
                    println!("{}", metadata_table(meta.as_ref()));
                }
                None => {
                    std::io::stdout().write_all(&data)?;
                    eprintln!("{}", metadata_table(meta.as_ref()));
                }
            }
        }
        Commands::Destroy { uid } => {
            store.try_destroy(uid)?;
            println!("✓ Destroyed {uid}");
        }
        Commands::Url { .. } | Commands::Uid { .. } => {}
    }

    Ok(())
}

/// Storage client for commands that never touch the bucket
struct NoClient;

impl bucketstore_core::StorageClient for NoClient {
    fn bucket_exists(&self) -> bucketstore_core::Result<bool> {
        Err(offline())
    }

    fn create_bucket(&self) -> bucketstore_core::Result<()> {
        Err(offline())
    }

    fn upload(
        &self,
        _key: &str,
        _data: &[u8],
        _headers: &bucketstore_core::codec::EncodedHeaders,
    ) -> bucketstore_core::Result<()> {
        Err(offline())
    }

    fn download(&self, _key: &str) -> bucketstore_core::Result<bucketstore_core::storage::StoredObject> {
        Err(offline())
    }

    fn delete(&self, _key: &str) -> bucketstore_core::Result<()> {
        Err(offline())
    }
}

fn offline() -> bucketstore_core::StoreError {
    bucketstore_core::StoreError::storage("no storage client for this command")
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Numbers, booleans and null keep their type; anything else is a string
fn parse_meta_value(raw: &str) -> MetaValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .filter(|value| !value.is_string())
        .and_then(|value| MetaValue::try_from(value).ok())
        .unwrap_or_else(|| MetaValue::from(raw))
}

fn metadata_table(meta: Option<&Metadata>) -> String {
    match meta {
        None => "No metadata".to_string(),
        Some(meta) if meta.is_empty() => "No metadata".to_string(),
        Some(meta) => {
            let rows: Vec<MetadataRow> = meta
                .iter()
                .map(|(key, value)| MetadataRow {
                    key: key.clone(),
                    value: value.to_string(),
                    kind: value.kind(),
                })
                .collect();
            Table::new(rows).to_string()
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_key_value("a=").unwrap(), ("a".to_string(), String::new()));
        assert!(parse_key_value("=b").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_parse_meta_value() {
        assert_eq!(parse_meta_value("64"), MetaValue::from(64i64));
        assert_eq!(parse_meta_value("true"), MetaValue::Bool(true));
        assert_eq!(parse_meta_value("null"), MetaValue::Null);
        assert_eq!(parse_meta_value("hello"), MetaValue::from("hello"));
        assert_eq!(parse_meta_value("\"64\""), MetaValue::from("\"64\""));
        assert_eq!(parse_meta_value("[1]"), MetaValue::from("[1]"));
    }

    #[test]
    fn test_url_without_bucket_access() {
        let config = DataStoreConfig::new("p", "b").with_domain("cdn.example.com");
        let store = DataStore::new(NoClient, config).unwrap();
        assert_eq!(
            store.url_for("x/y").as_deref(),
            Some("https://cdn.example.com/x/y")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }

    #[test]
    fn test_metadata_table() {
        assert_eq!(metadata_table(None), "No metadata");

        let mut meta = Metadata::new();
        meta.insert("width".to_string(), MetaValue::from(64i64));
        let table = metadata_table(Some(&meta));
        assert!(table.contains("width"));
        assert!(table.contains("number"));
    }
}
