use anyhow::{Context, Result};
use canvas_data::sql::{ddl_from_schema, reload_script, ReloadEntry};
use canvas_data::{
    dump_table_name, CanvasDataClient, CanvasDataError, Dump, DumpManifest, DumpRef, FileRef,
    Overrides, Settings, REQUESTS_TABLE, SELF_ACCOUNT,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "canvas-data")]
#[command(about = "A command-line tool to work with Canvas Data", long_about = None)]
#[command(version)]
struct Args {
    /// TOML config file with API credentials and directories
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API key (overrides CANVAS_DATA_API_KEY and the config file)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// API secret (overrides CANVAS_DATA_API_SECRET and the config file)
    #[arg(long, global = true)]
    api_secret: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a schema version (latest by default) as JSON, keyed by table name
    #[command(alias = "get_schema")]
    GetSchema {
        #[arg(long, default_value = "latest")]
        version: String,
    },

    /// Print DROP and CREATE statements for a schema version
    #[command(alias = "get_ddl")]
    GetDdl {
        #[arg(long, default_value = "latest")]
        version: String,
    },

    /// List available schema versions
    #[command(alias = "list_schema_versions")]
    ListSchemaVersions,

    /// List available dumps, most recent first
    #[command(alias = "list_dumps")]
    ListDumps {
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// Only dumps with a sequence number greater than this
        #[arg(long)]
        after: Option<u64>,
    },

    /// Download the fragment files of a dump, optionally for one table
    #[command(alias = "get_dump_files")]
    GetDumpFiles {
        /// Dump to fetch (defaults to the latest regular dump)
        #[arg(long, default_value = "latest")]
        dump_id: String,
        /// Store downloaded files in this directory
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Only get the files for a particular table
        #[arg(long)]
        table: Option<String>,
        /// Re-download files even if they already exist
        #[arg(long)]
        force: bool,
    },

    /// Download, decompress and reassemble the tables of a dump
    #[command(alias = "unpack_dump_files")]
    UnpackDumpFiles {
        /// Dump to unpack (defaults to the latest regular dump)
        #[arg(long, default_value = "latest")]
        dump_id: String,
        /// Store downloaded files in this directory
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Store unpacked files under this directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Only unpack a particular table
        #[arg(short, long)]
        table: Option<String>,
        /// Re-download and re-unpack files even if they already exist
        #[arg(long)]
        force: bool,
    },

    /// Download every file of the current full snapshot
    #[command(alias = "get_sync_files")]
    GetSyncFiles {
        /// Store downloaded files in this directory
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Re-download files even if they already exist
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("canvas_data={}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("❌ Error: {:#}", e);
        let code = e
            .downcast_ref::<CanvasDataError>()
            .map(CanvasDataError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    let (download_dir, data_dir) = match &args.command {
        Command::GetDumpFiles { download_dir, .. } | Command::GetSyncFiles { download_dir, .. } => {
            (download_dir.clone(), None)
        }
        Command::UnpackDumpFiles {
            download_dir,
            data_dir,
            ..
        } => (download_dir.clone(), data_dir.clone()),
        _ => (None, None),
    };
    let settings = Settings::resolve(Overrides {
        config_path: args.config.clone(),
        api_key: args.api_key.clone(),
        api_secret: args.api_secret.clone(),
        download_dir,
        data_dir,
    })?;
    let client = CanvasDataClient::from_settings(&settings)?;

    match args.command {
        Command::GetSchema { version } => {
            let schema = client.get_schema(&version, true).await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::GetDdl { version } => {
            let schema = client.get_schema(&version, true).await?;
            let (create, drop) = ddl_from_schema(&schema);
            for statement in drop.iter().chain(create.iter()) {
                println!("{};", statement);
            }
        }
        Command::ListSchemaVersions => {
            for version in client.list_schema_versions().await? {
                match version.created_at {
                    Some(at) => println!(
                        "{}\tcreated: {}",
                        version.version,
                        at.with_timezone(&Local)
                    ),
                    None => println!("{}", version.version),
                }
            }
        }
        Command::ListDumps { limit, after } => {
            let styled = atty::is(atty::Stream::Stdout);
            for dump in client.list_dumps(SELF_ACCOUNT, limit, after).await? {
                println!("{}", dump_line(&dump, styled));
            }
        }
        Command::GetDumpFiles {
            dump_id,
            table,
            force,
            ..
        } => {
            let manifest = resolve_manifest(&client, &dump_id).await?;
            let files = dump_files(&manifest, table.as_deref())?;
            download_with_spinner(&client, &files, &settings.download_dir, force).await?;
        }
        Command::UnpackDumpFiles {
            dump_id,
            table,
            force,
            ..
        } => {
            let manifest = resolve_manifest(&client, &dump_id).await?;
            unpack(&client, &manifest, &settings, table.as_deref(), force).await?;
        }
        Command::GetSyncFiles { force, .. } => {
            let sync = client.get_sync_manifest(SELF_ACCOUNT).await?;
            if sync.incomplete {
                info!("The sync snapshot is marked incomplete; downloading what is listed");
            }
            let files: Vec<FileRef> = sync
                .files
                .into_iter()
                .map(|f| FileRef {
                    filename: f.filename,
                    url: f.url,
                })
                .collect();
            download_with_spinner(&client, &files, &settings.download_dir, force).await?;
        }
    }
    Ok(())
}

/// Dumps with fewer files than this are usually incremental ones.
const SMALL_DUMP_FILES: u64 = 60;

/// One line of `list-dumps` output. Small dumps get white on blue when
/// `styled` is set.
fn dump_line(dump: &Dump, styled: bool) -> String {
    let line = format!(
        "{}\tsequence: {}\tfiles: {}\tschema: {}\tid: {}",
        dump.created_at.with_timezone(&Local),
        dump.sequence,
        dump.num_files,
        dump.schema_version,
        dump.dump_id
    );
    if styled && dump.num_files < SMALL_DUMP_FILES {
        format!("\x1b[37;44m{}\x1b[0m", line)
    } else {
        line
    }
}

/// Fetches the manifest for `dump_id`, resolving `latest` to the latest regular dump.
async fn resolve_manifest(client: &CanvasDataClient, dump_id: &str) -> Result<DumpManifest> {
    let dump_id = match DumpRef::parse(dump_id) {
        DumpRef::Latest => client.get_latest_regular_dump(SELF_ACCOUNT).await?,
        DumpRef::Id(id) => id,
    };
    info!("Using dump {}", dump_id);
    Ok(client
        .get_dump_manifest(SELF_ACCOUNT, &DumpRef::Id(dump_id))
        .await?)
}

fn dump_files(
    manifest: &DumpManifest,
    table: Option<&str>,
) -> Result<Vec<FileRef>, CanvasDataError> {
    match table {
        Some(table) => {
            let name = dump_table_name(table);
            manifest
                .artifacts_by_table
                .get(name)
                .map(|artifacts| artifacts.files.clone())
                .ok_or_else(|| {
                    CanvasDataError::InvalidArgument(format!(
                        "table {} is not part of dump sequence {}",
                        name, manifest.sequence
                    ))
                })
        }
        None => Ok(manifest
            .artifacts_by_table
            .iter()
            .filter(|(name, _)| name.as_str() != REQUESTS_TABLE)
            .flat_map(|(_, artifacts)| artifacts.files.iter().cloned())
            .collect()),
    }
}

async fn download_with_spinner(
    client: &CanvasDataClient,
    files: &[FileRef],
    download_dir: &Path,
    force: bool,
) -> Result<()> {
    let spinner = progress_spinner(format!("⬇️  Downloading {} files", files.len()));
    let result = client.fetch_files(files, download_dir, force).await;
    match &result {
        Ok(paths) => spinner.finish_with_message(format!(
            "✅ {} files in {}",
            paths.len(),
            download_dir.display()
        )),
        Err(_) => spinner.finish_with_message("❌ Download failed!"),
    }
    result?;
    Ok(())
}

async fn unpack(
    client: &CanvasDataClient,
    manifest: &DumpManifest,
    settings: &Settings,
    table: Option<&str>,
    force: bool,
) -> Result<()> {
    let tables = match table {
        Some(table) => vec![dump_table_name(table).to_string()],
        None => manifest.table_names(false),
    };

    // Each dump gets its own directory named after its sequence
    let dump_data_dir = settings.data_dir.join(manifest.sequence.to_string());

    let pb = progress_bar(tables.len() as u64);
    pb.set_message(format!("🔄 Unpacking {} tables", tables.len()));
    let mut entries = Vec::with_capacity(tables.len());
    for name in &tables {
        pb.set_message(format!("| 🔄 Unpacking: {}", name));
        let path = client
            .materialize_manifest_table(
                manifest,
                name,
                &dump_data_dir,
                &settings.download_dir,
                force,
            )
            .await;
        let path = match path {
            Ok(path) => path,
            Err(e) => {
                pb.finish_with_message("❌ Unpack failed!");
                return Err(e.into());
            }
        };
        let partial = manifest
            .artifacts_by_table
            .get(name)
            .map(|artifacts| artifacts.partial)
            .unwrap_or(false);
        let data_file = std::fs::canonicalize(&path)
            .with_context(|| format!("cannot resolve {}", path.display()))?;
        entries.push(ReloadEntry {
            table_name: name.clone(),
            data_file,
            partial,
        });
        pb.inc(1);
    }
    pb.finish_with_message(format!("✅ Unpacked {} tables", tables.len()));

    let script_name = match table {
        Some(_) => format!("reload_{}.sql", tables[0]),
        None => "reload_all.sql".to_string(),
    };
    let script_path = dump_data_dir.join(script_name);
    tokio::fs::create_dir_all(&dump_data_dir).await?;
    tokio::fs::write(&script_path, reload_script(&entries))
        .await
        .with_context(|| format!("cannot write {}", script_path.display()))?;
    info!("Wrote reload script {}", script_path.display());
    Ok(())
}

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed";

fn progress_bar(len: u64) -> ProgressBar {
    if !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb
}

fn progress_spinner(message: String) -> ProgressBar {
    if !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} | {elapsed_precise} elapsed")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
