use chrono::{DateTime, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use snow_report_service::pns::{BulletinParser, NormalizedRecord, NormalizerConfig};
use snow_report_service::store::{MergeReport, ObservationStore, TsvRepository};
use snow_report_service::utils::canonical_station_code;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "import-bulletins")]
#[command(about = "Import saved PNS bulletins (<OFFICE>_*.html|txt) into the observation store", long_about = None)]
struct Cli {
    /// Directory containing saved bulletin files
    dir: PathBuf,

    /// Observation store file
    #[arg(long, env = "STORE_PATH", default_value = "data/observations.tsv")]
    store_path: PathBuf,

    /// Collection time used to resolve abbreviated years (default: file modification time)
    #[arg(long)]
    collected_at: Option<DateTime<Utc>>,

    /// UTC offset applied to timestamps without a time zone
    #[arg(long, env = "DEFAULT_UTC_OFFSET_HOURS", default_value = "-5", allow_hyphen_values = true)]
    default_utc_offset_hours: i32,

    /// Parse and report without writing the store
    #[arg(long)]
    dry_run: bool,
}

/// Office code from a file name like `OKX_20250208.html`
fn office_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if extension != "html" && extension != "htm" && extension != "txt" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (office, _) = stem.split_once('_')?;
    canonical_station_code(office)
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let mut files: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in std::fs::read_dir(&cli.dir)? {
        let path = entry?.path();
        match office_for(&path) {
            Some(office) => files.entry(office).or_default().push(path),
            None => warn!("Skipping {}: not a <OFFICE>_*.html|txt file", path.display()),
        }
    }
    let file_count: usize = files.values().map(Vec::len).sum();
    info!("Found {} bulletin files for {} offices", file_count, files.len());

    let parser = BulletinParser::new(NormalizerConfig {
        default_utc_offset_hours: cli.default_utc_offset_hours,
        ..Default::default()
    })?;
    let store = ObservationStore::open(TsvRepository::new(cli.store_path.clone()))?;

    let pb = ProgressBar::new(file_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut totals = MergeReport::default();
    let mut fatal = 0;
    for (office, paths) in &files {
        pb.set_message(office.clone());
        let mut batch: Vec<NormalizedRecord> = Vec::new();

        for path in paths {
            let bytes = std::fs::read(path)?;
            let collected_at = cli
                .collected_at
                .or_else(|| modified_at(path))
                .unwrap_or_else(Utc::now);

            match parser.parse_bytes(office, &bytes, collected_at) {
                Ok(parsed) => batch.extend(parsed.records),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    fatal += 1;
                }
            }
            pb.inc(1);
        }

        totals += store.merge_batch(&batch)?;
    }
    pb.finish_with_message("✓ Parsed all bulletins");

    let stored = if cli.dry_run {
        info!("Dry run, store not written");
        store.len()?
    } else {
        store.persist()?
    };

    println!("\nImport summary:");
    println!("  Files:              {}", file_count);
    println!("  Unreadable files:   {}", fatal);
    println!("  Inserted:           {}", totals.inserted);
    println!("  Superseded:         {}", totals.superseded);
    println!("  Unchanged:          {}", totals.unchanged);
    println!("  Stale:              {}", totals.stale);
    println!("  Ambiguities:        {}", totals.ambiguities);
    println!("  Invalid records:    {}", totals.skipped_invalid);
    println!("  Stored rows:        {}", stored);
    println!("  Elapsed:            {:.2?}", start.elapsed());

    Ok(())
}
