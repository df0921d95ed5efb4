//! Mirror - command-line front end for the incremental backup engine.
//!
//! Loads the profile configuration, then runs each executable profile in
//! turn: scan, execute, rewrite the index. All presentation lives here
//! (timestamped log lines, the progress bar, run summaries); every backup
//! decision is made by the engine crate.

use clap::Parser;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::{
    load_profiles, BackupIndex, EngineError, Executor, LogSink, OpStats, Phase, PhaseProgress,
    Profile, ProgressTracker, RunReport, Scanner,
};

/// Mirror - incremental metadata-driven file backup
#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(version = "0.1.0")]
#[command(about = "Mirror changed files into backup trees, profile by profile")]
struct Args {
    /// Profile configuration file (JSON array of profiles)
    #[arg(long, value_name = "PATH", default_value = "profiles.json")]
    config: PathBuf,

    /// Only run the profile with this name
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// Append log lines to this file in addition to stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Delete backup copies of files that disappeared from the source
    #[arg(long)]
    remove_stale: bool,

    /// List every classified file, not just the summary
    #[arg(long)]
    verbose: bool,
}

/// Log sink prefixing each engine message with a local timestamp, written
/// to stderr and optionally appended to a log file.
struct RunLogger {
    file: Option<RefCell<File>>,
}

impl RunLogger {
    fn new(log_file: Option<&Path>) -> Result<RunLogger, String> {
        let file = match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| format!("Cannot open log file {}: {}", path.display(), e))?;
                Some(RefCell::new(file))
            }
            None => None,
        };
        Ok(RunLogger { file })
    }
}

impl LogSink for RunLogger {
    fn log(&self, message: &str) {
        let line = format!(
            "[{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        if let Some(file) = &self.file {
            let _ = writeln!(file.borrow_mut(), "{}", line);
        }
        eprintln!("{}", line);
    }
}

/// Renders a live progress bar for each execution phase.
struct ConsoleProgress {
    tracker: RefCell<Option<ProgressTracker>>,
}

impl ConsoleProgress {
    fn new() -> ConsoleProgress {
        ConsoleProgress {
            tracker: RefCell::new(None),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_remaining(remaining: Duration) -> String {
        let secs = remaining.as_secs_f64();
        if secs > 60.0 {
            format!("Est Remaining: {:.1} min", secs / 60.0)
        } else {
            format!("Est Remaining: {:.1} sec", secs)
        }
    }

    fn progress_bar(fraction: f64) -> String {
        const BAR_LENGTH: usize = 30;
        let filled = (BAR_LENGTH as f64 * fraction) as usize;
        let filled = filled.min(BAR_LENGTH);
        format!("[{}{}]", "=".repeat(filled), " ".repeat(BAR_LENGTH - filled))
    }
}

impl PhaseProgress for ConsoleProgress {
    fn on_phase_started(&self, phase: Phase, total_ops: usize, total_bytes: u64) {
        if total_ops == 0 {
            *self.tracker.borrow_mut() = None;
            return;
        }
        // copy progress is measured in bytes when sizes are known
        let total = if phase == Phase::Copy && total_bytes > 0 {
            total_bytes
        } else {
            total_ops as u64
        };
        *self.tracker.borrow_mut() = Some(ProgressTracker::new(total));
        eprintln!("{} phase: {} operations", phase, total_ops);
    }

    fn on_operation_completed(
        &self,
        phase: Phase,
        completed: usize,
        total_ops: usize,
        bytes_done: u64,
    ) {
        let mut borrow = self.tracker.borrow_mut();
        let Some(tracker) = borrow.as_mut() else {
            return;
        };
        let current = if phase == Phase::Copy && bytes_done > 0 {
            bytes_done
        } else {
            completed as u64
        };
        tracker.update(current);

        eprint!(
            "\r{} {}/{} ({:.1}%) {}{}",
            Self::progress_bar(tracker.fraction()),
            completed,
            total_ops,
            tracker.fraction() * 100.0,
            Self::format_remaining(tracker.estimated_remaining()),
            " ".repeat(10)
        );
        let _ = std::io::stderr().flush();
    }

    fn on_phase_completed(&self, _phase: Phase, stats: &OpStats) {
        let mut borrow = self.tracker.borrow_mut();
        let Some(tracker) = borrow.as_mut() else {
            return;
        };
        tracker.mark_complete();
        eprintln!();
        if stats.bytes > 0 {
            eprintln!("Transferred: {}", Self::format_bytes(stats.bytes));
        }
        *borrow = None;
    }
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn print_summary(report: &RunReport, stale_removed: bool) {
    eprintln!();
    eprintln!("Profile '{}' complete", report.profile);
    eprintln!(
        "Summary: {} new, {} modified, {} moved, {} unchanged, {} skipped",
        report.scan.new,
        report.scan.modified,
        report.scan.moved,
        report.scan.unchanged,
        report.scan.skipped
    );

    if let Some(exec) = &report.exec {
        eprintln!(
            "Executed: {}/{} moves, {}/{} copies, {} directories synced",
            exec.moves.completed,
            exec.moves.attempted(),
            exec.copies.completed,
            exec.copies.attempted(),
            exec.dirs_synced
        );
        if let Some(removed) = &exec.removed {
            eprintln!(
                "Stale: {} removed, {} failed",
                removed.completed, removed.failed
            );
        }
    }
    if report.scan.stale > 0 && !stale_removed {
        eprintln!(
            "Stale: {} entries kept (run with --remove-stale to delete their backup copies)",
            report.scan.stale
        );
    }
    if let Some(elapsed) = report.elapsed() {
        eprintln!("Elapsed: {}", format_elapsed(elapsed));
    }
}

/// Run one profile: load index, scan, execute, rewrite the index. Any
/// error returned here abandons this profile only; the index file is left
/// untouched in that case so the next run simply redoes the work.
fn run_profile(profile: &Profile, args: &Args, logger: &RunLogger) -> engine::Result<RunReport> {
    let mut report = RunReport::begin(&profile.name);
    logger.log(&format!(
        "Run {} starting profile '{}'",
        report.id, profile.name
    ));

    let index = BackupIndex::load(&profile.index_path);
    let outcome = Scanner::new(profile, &index, logger).scan()?;
    report.scan = outcome.stats;

    if args.verbose {
        for classified in &outcome.records {
            let mark = if classified.relocated { " (moved)" } else { "" };
            eprintln!(
                "  {}{}: {}",
                classified.classification,
                mark,
                classified.record.source_path.display()
            );
        }
    }

    let progress = ConsoleProgress::new();
    let executor = Executor::with_progress(logger, &progress);
    let mut exec = executor.execute(&outcome.queue);

    if args.remove_stale && !outcome.stale.is_empty() {
        exec.removed = Some(executor.remove_stale(&outcome.stale));
    }

    BackupIndex::rewrite(&profile.index_path, &outcome.retained)?;

    report.exec = Some(exec);
    report.finish();
    Ok(report)
}

/// Main CLI logic - separated for testability. Returns the number of
/// profiles that failed.
fn run_cli(args: &Args) -> Result<usize, String> {
    let logger = RunLogger::new(args.log_file.as_deref())?;

    // a missing configuration file aborts the whole run
    let profiles = load_profiles(&args.config).map_err(|e| match e {
        EngineError::ConfigNotFound { .. } => e.to_string(),
        other => format!("Cannot load profiles: {}", other),
    })?;

    let selected: Vec<&Profile> = match &args.profile {
        Some(name) => {
            let matched: Vec<&Profile> = profiles.iter().filter(|p| &p.name == name).collect();
            if matched.is_empty() {
                return Err(format!("No profile named '{}' in {}", name, args.config.display()));
            }
            matched
        }
        None => profiles.iter().collect(),
    };

    let mut failures = 0;
    for profile in selected {
        if !profile.is_executable() {
            logger.log(&format!(
                "Profile '{}' is not executable in the current setup; skipping",
                profile.name
            ));
            continue;
        }

        match run_profile(profile, args, &logger) {
            Ok(report) => print_summary(&report, args.remove_stale),
            Err(e) => {
                failures += 1;
                logger.log(&format!("Profile '{}' failed: {}", profile.name, e));
            }
        }
    }

    Ok(failures)
}

fn main() {
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(0) => 0,
        Ok(_) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args_for(config: &Path) -> Args {
        Args {
            config: config.to_path_buf(),
            profile: None,
            log_file: None,
            remove_stale: false,
            verbose: false,
        }
    }

    fn write_config(dir: &Path, profiles: &str) -> PathBuf {
        let path = dir.join("profiles.json");
        fs::write(&path, profiles).expect("Failed to write config");
        path
    }

    fn single_profile_config(dir: &Path) -> PathBuf {
        let original = dir.join("src");
        let backup = dir.join("dst");
        fs::create_dir_all(&original).expect("Failed to create src dir");
        fs::create_dir_all(&backup).expect("Failed to create dst dir");
        write_config(
            dir,
            &format!(
                r#"[{{
                    "name": "main",
                    "original_path": "{}",
                    "backup_path": "{}",
                    "index_path": "{}"
                }}]"#,
                original.display(),
                backup.display(),
                dir.join("index.txt").display()
            ),
        )
    }

    #[test]
    fn test_run_cli_backs_up_and_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = single_profile_config(temp_dir.path());
        fs::write(temp_dir.path().join("src").join("a.txt"), "hello")
            .expect("Failed to write file");

        let args = args_for(&config);
        let failures = run_cli(&args).expect("First run should succeed");
        assert_eq!(failures, 0);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("dst").join("a.txt"))
                .expect("Failed to read backup"),
            "hello"
        );

        // index was persisted
        let index_text =
            fs::read_to_string(temp_dir.path().join("index.txt")).expect("Failed to read index");
        assert!(index_text.contains("[index-sep]"));

        // running again with no source changes leaves the backup intact
        let failures = run_cli(&args).expect("Second run should succeed");
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_run_cli_missing_config_aborts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let args = args_for(&temp_dir.path().join("absent.json"));

        let result = run_cli(&args);
        assert!(result.is_err(), "Missing configuration should abort the run");
    }

    #[test]
    fn test_run_cli_rejects_unknown_profile_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = single_profile_config(temp_dir.path());

        let mut args = args_for(&config);
        args.profile = Some("nonexistent".to_string());

        let result = run_cli(&args);
        assert!(result.is_err(), "Unknown profile name should be rejected");
    }

    #[test]
    fn test_run_cli_skips_non_executable_profiles() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        // original path does not exist, so the profile is skipped, not failed
        let config = write_config(
            temp_dir.path(),
            &format!(
                r#"[{{
                    "name": "broken",
                    "original_path": "{}",
                    "backup_path": "{}",
                    "index_path": "{}"
                }}]"#,
                temp_dir.path().join("no-src").display(),
                temp_dir.path().join("no-dst").display(),
                temp_dir.path().join("index.txt").display()
            ),
        );

        let failures = run_cli(&args_for(&config)).expect("Run should succeed");
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_run_cli_remove_stale_deletes_backup_copy() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = single_profile_config(temp_dir.path());
        let source = temp_dir.path().join("src").join("a.txt");
        fs::write(&source, "data").expect("Failed to write file");

        let mut args = args_for(&config);
        args.remove_stale = true;

        run_cli(&args).expect("First run should succeed");
        let backup = temp_dir.path().join("dst").join("a.txt");
        assert!(backup.exists());

        // delete the source; the next run removes the stale backup copy
        fs::remove_file(&source).expect("Failed to remove source");
        run_cli(&args).expect("Second run should succeed");
        assert!(!backup.exists());
    }

    #[test]
    fn test_logger_appends_to_log_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let log_path = temp_dir.path().join("run.log");

        let logger = RunLogger::new(Some(&log_path)).expect("Failed to create logger");
        logger.log("first message");
        logger.log("second message");

        let text = fs::read_to_string(&log_path).expect("Failed to read log file");
        assert!(text.contains("first message"));
        assert!(text.contains("second message"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_format_bytes_picks_sensible_units() {
        assert_eq!(ConsoleProgress::format_bytes(512), "512.00 B");
        assert_eq!(ConsoleProgress::format_bytes(2048), "2.00 KB");
        assert_eq!(ConsoleProgress::format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(150)), "2m 30s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(3750)), "1h 2m 30s");
    }
}
