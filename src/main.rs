use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rezulta::config;
use rezulta::db;
use rezulta::models::{ObservedRow, PatientInfo, TEST_DEFINITIONS};
use rezulta::pipeline::batch::{
    self, new_batch_id, BatchConfig, BatchError, QueueItem, ReportSource,
};
use rezulta::pipeline::export::{build_ledger, validate_completeness};
use rezulta::pipeline::extraction::{compile_rules, parse_report_info};
use rezulta::pipeline::matching::match_roster;
use rezulta::pipeline::roster::{auto_detect_prefix, parse_roster};

#[derive(Parser)]
#[command(name = "rezulta")]
#[command(about = "Lab-report extraction, roster reconciliation and export ledger")]
#[command(version)]
struct Cli {
    /// Queue database path (defaults to ~/Rezulta/queue.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract report files and merge them into the queue
    Ingest {
        /// Session identifier prefix (e.g. 25S19)
        #[arg(long)]
        prefix: String,
        /// Roster feed used to assign identifier suffixes to the reports
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Report text files, one per patient
        reports: Vec<PathBuf>,
    },
    /// Match an external roster against observed patients
    MatchRoster {
        /// Roster feed file (CSV with name and identifier columns)
        #[arg(long)]
        roster: PathBuf,
        /// Observed patients file, one `name[,status]` per line
        #[arg(long)]
        patients: PathBuf,
        /// Session identifier prefix; auto-detected from the roster if omitted
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Re-acquire one stored patient's report and merge new tests
    Refetch {
        /// Session identifier prefix
        #[arg(long)]
        prefix: String,
        /// Patient name as observed in the listing
        name: String,
        /// Report text file
        report: PathBuf,
    },
    /// Write the export file and mark its tests in the ledger
    Export {
        /// Session identifier prefix
        #[arg(long)]
        prefix: String,
        /// Output directory (defaults to the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show queue counts
    Status,
    /// Exclude a patient from export (ledger history is kept)
    Exclude { key: String },
    /// Re-include a previously excluded patient
    Include { key: String },
    /// Reset the export ledger so every patient becomes exportable again
    ResetExported,
    /// Delete the whole queue
    Clear,
}

/// Report source backed by files on disk, keyed by queue item id.
struct FileReportSource {
    paths: HashMap<String, PathBuf>,
}

impl ReportSource for FileReportSource {
    fn fetch_report_text(&self, item: &QueueItem) -> Result<String, BatchError> {
        let path = self
            .paths
            .get(&item.id)
            .ok_or_else(|| BatchError::Source(format!("no report file for {}", item.patient.name)))?;
        std::fs::read_to_string(path)
            .map_err(|e| BatchError::Source(format!("{}: {e}", path.display())))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    rezulta::init_tracing();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(config::database_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = db::open_database(&db_path)?;

    match cli.command {
        Commands::Ingest { prefix, roster, reports } => {
            ingest(&conn, &prefix, roster.as_deref(), &reports)?
        }
        Commands::MatchRoster { roster, patients, prefix } => {
            run_match(&roster, &patients, prefix.as_deref())?
        }
        Commands::Refetch { prefix, name, report } => refetch(&conn, &prefix, &name, &report)?,
        Commands::Export { prefix, out } => export(&conn, &prefix, out.as_deref())?,
        Commands::Status => status(&conn)?,
        Commands::Exclude { key } => {
            db::set_excluded(&conn, &key, true)?;
            println!("Excluded {key}");
        }
        Commands::Include { key } => {
            db::set_excluded(&conn, &key, false)?;
            println!("Included {key}");
        }
        Commands::ResetExported => {
            let reset = db::reset_exported(&conn)?;
            println!("Reset export state for {reset} patient(s)");
        }
        Commands::Clear => {
            db::clear_queue(&conn)?;
            println!("Queue cleared");
        }
    }

    Ok(())
}

fn ingest(
    conn: &rusqlite::Connection,
    prefix: &str,
    roster_path: Option<&Path>,
    reports: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let rules = compile_rules(TEST_DEFINITIONS)?;

    let mut names = Vec::new();
    for (row_ref, path) in reports.iter().enumerate() {
        let text = std::fs::read_to_string(path)?;
        let name = parse_report_info(&text)
            .patient_name
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| format!("report {row_ref}"));
        names.push(name);
    }

    // With a roster supplied, identifier suffixes are assigned up front.
    let mut suffixes: HashMap<usize, String> = HashMap::new();
    if let Some(roster_path) = roster_path {
        let roster = parse_roster(&std::fs::read_to_string(roster_path)?)?;
        let observed: Vec<ObservedRow> = names
            .iter()
            .enumerate()
            .map(|(row_ref, name)| ObservedRow {
                name: name.clone(),
                status_label: config::STATUS_COMPLETE.to_string(),
                row_ref,
                suffix: None,
            })
            .collect();

        let outcome = match_roster(&roster, &observed, prefix.len());
        for m in &outcome.matches {
            suffixes.insert(m.local.row_ref, m.suffix.clone());
        }
        for u in &outcome.unmatched {
            eprintln!(
                "UNMATCHED {} (best: {} score {:.3})",
                u.local.name,
                u.best_candidate.as_ref().map(|r| r.name.as_str()).unwrap_or("none"),
                u.best_score
            );
        }
    }

    let mut items = Vec::new();
    let mut paths = HashMap::new();
    for (row_ref, (path, name)) in reports.iter().zip(names).enumerate() {
        let item = QueueItem {
            id: new_batch_id(),
            patient: PatientInfo {
                id_prefix: prefix.to_string(),
                name,
                patient_suffix: suffixes.get(&row_ref).cloned(),
            },
            row_ref,
            imported_status: config::STATUS_COMPLETE.to_string(),
        };
        paths.insert(item.id.clone(), path.clone());
        items.push(item);
    }

    let source = Arc::new(FileReportSource { paths });
    let result = batch::run_batch(conn, &items, source, &rules, &BatchConfig::default(), None)?;

    for success in &result.successes {
        println!("{}: {} test(s)", success.patient_name, success.tests_found);
    }
    for failure in &result.failures {
        eprintln!("FAILED {}: {}", failure.patient_name, failure.error);
    }
    println!(
        "Processed {} report(s), {} failure(s) in {} ms",
        result.successes.len(),
        result.failures.len(),
        result.duration_ms
    );
    Ok(())
}

fn run_match(
    roster_path: &Path,
    patients_path: &Path,
    prefix: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let roster = parse_roster(&std::fs::read_to_string(roster_path)?)?;

    let prefix = match prefix {
        Some(p) => p.to_string(),
        None => auto_detect_prefix(&roster).ok_or("could not auto-detect an identifier prefix")?,
    };

    let observed = read_observed(patients_path)?;
    let matchable: Vec<ObservedRow> = observed
        .into_iter()
        .filter(|row| config::is_matchable_status(&row.status_label))
        .collect();

    let outcome = match_roster(&roster, &matchable, prefix.len());

    for m in &outcome.matches {
        println!(
            "{} -> {} (suffix {}, {:?}, score {:.3})",
            m.local.name, m.roster.name, m.suffix, m.quality, m.similarity
        );
    }
    for u in &outcome.unmatched {
        println!(
            "UNMATCHED {} (best: {} score {:.3})",
            u.local.name,
            u.best_candidate.as_ref().map(|r| r.name.as_str()).unwrap_or("none"),
            u.best_score
        );
    }
    println!(
        "{} matched, {} unmatched (prefix {prefix})",
        outcome.matches.len(),
        outcome.unmatched.len()
    );
    Ok(())
}

fn read_observed(path: &Path) -> Result<Vec<ObservedRow>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let rows = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(row_ref, line)| {
            let mut fields = line.splitn(2, ',').map(str::trim);
            let name = fields.next().unwrap_or("").to_string();
            let status_label = fields
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(config::STATUS_COMPLETE)
                .to_string();
            ObservedRow { name, status_label, row_ref, suffix: None }
        })
        .filter(|row| !row.name.is_empty())
        .collect();
    Ok(rows)
}

fn refetch(
    conn: &rusqlite::Connection,
    prefix: &str,
    name: &str,
    report: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let rules = compile_rules(TEST_DEFINITIONS)?;
    let key = rezulta::models::patient_key(prefix, name);

    let item = QueueItem {
        id: new_batch_id(),
        patient: PatientInfo {
            id_prefix: prefix.to_string(),
            name: name.to_string(),
            patient_suffix: None,
        },
        row_ref: 0,
        imported_status: config::STATUS_COMPLETE.to_string(),
    };
    let source = Arc::new(FileReportSource {
        paths: HashMap::from([(item.id.clone(), report.to_path_buf())]),
    });

    let outcome =
        batch::refetch_patient(conn, &key, &item, source, &rules, &BatchConfig::default())?;
    println!(
        "Refetched {name}: {} new test(s), {} total",
        outcome.new_tests, outcome.total_tests
    );
    Ok(())
}

fn export(
    conn: &rusqlite::Connection,
    prefix: &str,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pending = db::pending_export_set(conn)?;
    let ledger = build_ledger(&pending, prefix, chrono::Local::now())?;

    for issue in validate_completeness(&pending, &ledger.content) {
        eprintln!(
            "WARNING: no rows exported for {} ({} extracted test(s))",
            issue.patient, issue.extracted_tests
        );
    }

    let out_path = out.unwrap_or_else(|| Path::new(".")).join(&ledger.filename);
    std::fs::write(&out_path, &ledger.content)?;

    let marked = db::mark_exported(conn, &ledger.identity_keys, chrono::Utc::now())?;
    println!(
        "Wrote {} line(s) for {} patient(s) to {} ({marked} test(s) marked exported)",
        ledger.line_count,
        ledger.identity_keys.len(),
        out_path.display()
    );
    Ok(())
}

fn status(conn: &rusqlite::Connection) -> Result<(), Box<dyn std::error::Error>> {
    let queue = db::load_queue(conn)?;
    let pending = db::pending_export_set(conn)?;
    let excluded = queue.iter().filter(|r| r.excluded).count();
    let status_changed = queue.iter().filter(|r| r.status_changed_since_import).count();
    let needs_reexport = queue.iter().filter(|r| r.needs_reexport).count();

    println!("Patients in queue:     {}", queue.len());
    println!("Pending export:        {}", pending.len());
    println!("Excluded:              {excluded}");
    println!("Status changed:        {status_changed}");
    println!("Needs re-export:       {needs_reexport}");
    Ok(())
}
