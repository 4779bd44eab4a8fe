use chrono::{DateTime, Utc};
use clap::Parser;
use snow_report_service::pns::{BulletinParser, NormalizedRecord, NormalizerConfig};

#[derive(Parser)]
#[command(name = "check-bulletin")]
#[command(about = "Parse one saved PNS bulletin and print its records", long_about = None)]
struct Cli {
    /// Bulletin file (HTML or plain text)
    file: std::path::PathBuf,

    /// Issuing office code, e.g. OKX
    #[arg(long)]
    office: String,

    /// Collection time used to resolve abbreviated years (default: now)
    #[arg(long)]
    collected_at: Option<DateTime<Utc>>,

    /// UTC offset applied to timestamps without a time zone
    #[arg(long, env = "DEFAULT_UTC_OFFSET_HOURS", default_value = "-5", allow_hyphen_values = true)]
    default_utc_offset_hours: i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let parser = BulletinParser::new(NormalizerConfig {
        default_utc_offset_hours: cli.default_utc_offset_hours,
        ..Default::default()
    })?;
    let bytes = std::fs::read(&cli.file)?;
    let parsed = parser.parse_bytes(
        &cli.office,
        &bytes,
        cli.collected_at.unwrap_or_else(Utc::now),
    )?;

    println!(
        "Parsed {} blocks from {} ({} valid, {} invalid)\n",
        parsed.block_count(),
        cli.file.display(),
        parsed.valid_count(),
        parsed.invalid_count()
    );

    for record in &parsed.records {
        match record {
            NormalizedRecord::Valid(r) => println!(
                "  {:<4} {}  {:>6.2} in  {:<14} {}",
                r.station_id,
                r.observed_at.to_rfc3339(),
                r.measurement,
                r.event_code.as_deref().unwrap_or("-"),
                r.location_name.as_deref().unwrap_or("")
            ),
            NormalizedRecord::Invalid(r) => {
                let failed: Vec<String> = r.failed_fields.iter().map(|f| f.to_string()).collect();
                println!(
                    "  !    block {} invalid ({}): {:?}",
                    r.block_index,
                    failed.join(", "),
                    r.raw
                );
            }
        }
    }

    if !parsed.gaps.is_empty() {
        println!("\nStructural gaps:");
        for gap in &parsed.gaps {
            println!("  {}", gap);
        }
    }

    Ok(())
}
