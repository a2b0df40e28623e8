//! OS-level schedule config generators (§6). Plain functions producing
//! config text for launchd, systemd, and cron; they never run anything
//! themselves — that's `RuntimeScheduler`'s job. Grounded line-for-line on
//! the legacy `install_generators.py`.

use accord_domain::Schedule;

pub struct InstallTarget<'a> {
    pub job_name: &'a str,
    pub schedule: &'a Schedule,
    pub working_directory: &'a str,
    pub binary_path: &'a str,
}

pub fn generate_launchd_plist(target: &InstallTarget) -> String {
    let label = format!("com.accord.{}", target.job_name);
    let log_dir = format!("{}/logs", target.working_directory);

    let interval_xml = match target.schedule {
        Schedule::Interval { interval_seconds } => format!(
            "    <key>StartInterval</key>\n    <integer>{interval_seconds}</integer>"
        ),
        Schedule::Daily { times } => match times.first() {
            Some(t) => format!(
                "    <key>StartCalendarInterval</key>\n    <dict>\n        <key>Hour</key>\n        <integer>{}</integer>\n        <key>Minute</key>\n        <integer>{}</integer>\n    </dict>",
                t.format("%H"),
                t.format("%M"),
            ),
            None => "    <key>StartInterval</key>\n    <integer>1800</integer>".to_string(),
        },
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN"
  "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
        <string>run-job</string>
        <string>{job_name}</string>
    </array>
    <key>WorkingDirectory</key>
    <string>{workdir}</string>
{interval_xml}
    <key>StandardOutPath</key>
    <string>{log_dir}/{job_name}.log</string>
    <key>StandardErrorPath</key>
    <string>{log_dir}/{job_name}.err</string>
</dict>
</plist>
"#,
        binary = target.binary_path,
        job_name = target.job_name,
        workdir = target.working_directory,
    )
}

/// Returns `(service_unit, timer_unit)`.
pub fn generate_systemd_units(target: &InstallTarget) -> (String, String) {
    let service = format!(
        r#"[Unit]
Description=Accord scheduler job {job_name}
After=network.target

[Service]
Type=oneshot
WorkingDirectory={workdir}
ExecStart={binary} run-job {job_name}

[Install]
WantedBy=multi-user.target
"#,
        job_name = target.job_name,
        workdir = target.working_directory,
        binary = target.binary_path,
    );

    let timer_schedule = match target.schedule {
        Schedule::Interval { interval_seconds } => {
            format!("OnBootSec=0s\nOnUnitActiveSec={interval_seconds}s")
        }
        Schedule::Daily { times } => times
            .iter()
            .map(|t| format!("OnCalendar=*-*-* {}:00", t.format("%H:%M")))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    let timer = format!(
        r#"[Unit]
Description=Timer for Accord scheduler job {job_name}

[Timer]
{timer_schedule}
Persistent=true

[Install]
WantedBy=timers.target
"#,
        job_name = target.job_name,
    );

    (service, timer)
}

pub fn generate_crontab_entry(target: &InstallTarget) -> String {
    let cmd = format!(
        "cd {} && {} run-job {}",
        target.working_directory, target.binary_path, target.job_name
    );

    match target.schedule {
        Schedule::Interval { interval_seconds } => {
            let minutes = (*interval_seconds / 60).max(1);
            format!("*/{minutes} * * * * {cmd}  # {}", target.job_name)
        }
        Schedule::Daily { times } => times
            .iter()
            .map(|t| format!("{} {} * * * {cmd}  # {}", t.format("%M"), t.format("%H"), target.job_name))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
