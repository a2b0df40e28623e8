//! Operator-facing `install`/`uninstall` subcommands (§6). Looks up one of
//! the fixed global jobs by name, renders the requested backend's config
//! text with `accord_scheduler::install`, and writes it to disk. Per-user
//! jobs (`checkin_<id>`, `struggle_<id>`) are installed/removed by the
//! running process itself, not this offline path.

use std::fs;
use std::path::PathBuf;

use accord_domain::Schedule;
use accord_scheduler::install::{
    InstallTarget, generate_crontab_entry, generate_launchd_plist, generate_systemd_units,
};
use chrono::NaiveTime;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Backend {
    Launchd,
    Systemd,
    Cron,
}

/// Every global (non-per-user) job this process schedules, and the fixed
/// schedule each runs on (§4.7, §4.10, §4.11, §4.13).
fn known_job_schedule(job_name: &str, srs_morning_batch_time: NaiveTime) -> Option<Schedule> {
    match job_name {
        "retention_sweep" => Some(Schedule::Interval {
            interval_seconds: 86_400,
        }),
        "srs_recompute" => Some(Schedule::Interval {
            interval_seconds: 3600,
        }),
        "srs_morning_batch" => Some(Schedule::Daily {
            times: vec![srs_morning_batch_time],
        }),
        "life_weeks" => Some(Schedule::Daily {
            times: accord_scheduler::life_weeks::FIRE_TIMES
                .iter()
                .map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0).expect("fixed constants"))
                .collect(),
        }),
        _ => None,
    }
}

/// Returns the process exit code: 0 on success, 1 for an unknown job or
/// backend (§6).
pub fn install(
    job_name: &str,
    backend: Backend,
    working_directory: &str,
    binary_path: &str,
    srs_morning_batch_time: NaiveTime,
) -> i32 {
    let Some(schedule) = known_job_schedule(job_name, srs_morning_batch_time) else {
        eprintln!("unknown job: {job_name}");
        return 1;
    };

    let target = InstallTarget {
        job_name,
        schedule: &schedule,
        working_directory,
        binary_path,
    };

    let (path, contents): (PathBuf, Vec<(PathBuf, String)>) = match backend {
        Backend::Launchd => {
            let plist = generate_launchd_plist(&target);
            let path = PathBuf::from(working_directory)
                .join(format!("com.accord.{job_name}.plist"));
            (path.clone(), vec![(path, plist)])
        }
        Backend::Systemd => {
            let (service, timer) = generate_systemd_units(&target);
            let service_path =
                PathBuf::from(working_directory).join(format!("accord-{job_name}.service"));
            let timer_path =
                PathBuf::from(working_directory).join(format!("accord-{job_name}.timer"));
            (
                service_path.clone(),
                vec![(service_path, service), (timer_path, timer)],
            )
        }
        Backend::Cron => {
            let entry = generate_crontab_entry(&target);
            let path = PathBuf::from(working_directory).join(format!("accord-{job_name}.cron"));
            (path.clone(), vec![(path, entry)])
        }
    };

    for (file_path, text) in &contents {
        if let Err(e) = fs::write(file_path, text) {
            eprintln!("failed to write {}: {e}", file_path.display());
            return 1;
        }
    }

    println!("installed {job_name} ({path:?})");
    0
}

/// Returns the process exit code: 0 on success, 1 for an unknown job or
/// backend (§6).
pub fn uninstall(job_name: &str, backend: Backend, working_directory: &str) -> i32 {
    if known_job_schedule(job_name, NaiveTime::from_hms_opt(9, 0, 0).unwrap()).is_none() {
        eprintln!("unknown job: {job_name}");
        return 1;
    }

    let paths: Vec<PathBuf> = match backend {
        Backend::Launchd => vec![
            PathBuf::from(working_directory).join(format!("com.accord.{job_name}.plist")),
        ],
        Backend::Systemd => vec![
            PathBuf::from(working_directory).join(format!("accord-{job_name}.service")),
            PathBuf::from(working_directory).join(format!("accord-{job_name}.timer")),
        ],
        Backend::Cron => {
            vec![PathBuf::from(working_directory).join(format!("accord-{job_name}.cron"))]
        }
    };

    for path in &paths {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                eprintln!("failed to remove {}: {e}", path.display());
                return 1;
            }
        }
    }

    println!("uninstalled {job_name}");
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_job_schedule_recognizes_all_four_global_jobs() {
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(known_job_schedule("retention_sweep", t).is_some());
        assert!(known_job_schedule("srs_recompute", t).is_some());
        assert!(known_job_schedule("srs_morning_batch", t).is_some());
        assert!(known_job_schedule("life_weeks", t).is_some());
    }

    #[test]
    fn known_job_schedule_rejects_per_user_job_names() {
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(known_job_schedule("checkin_user-1", t).is_none());
    }

    #[test]
    fn install_returns_1_for_an_unknown_job() {
        let code = install(
            "not_a_real_job",
            Backend::Cron,
            "/tmp",
            "/usr/local/bin/accord",
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );
        assert_eq!(code, 1);
    }
}
