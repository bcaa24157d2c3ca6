//! System stats tool: a short status report of the host.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};
use sysinfo::System;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One sample of host metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub os: String,
    pub cpu_percent: f32,
    /// Bytes
    pub memory_used: u64,
    /// Bytes
    pub memory_total: u64,
    pub uptime_secs: u64,
}

impl SystemSnapshot {
    /// Sample the host. Blocks for one CPU measurement interval.
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let name = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        let os = match System::kernel_version() {
            Some(kernel) => format!("{name} {kernel}"),
            None => name,
        };

        Self {
            os,
            cpu_percent: sys.global_cpu_usage(),
            memory_used: sys.used_memory(),
            memory_total: sys.total_memory(),
            uptime_secs: System::uptime(),
        }
    }

    pub fn memory_percent(&self) -> f64 {
        if self.memory_total == 0 {
            return 0.0;
        }
        self.memory_used as f64 / self.memory_total as f64 * 100.0
    }

    pub fn report(&self, now: DateTime<Local>) -> String {
        let hours = self.uptime_secs / 3600;
        let minutes = (self.uptime_secs % 3600) / 60;
        format!(
            "SYSTEM STATUS REPORT:\n\
             ---------------------\n\
             TIME      : {}\n\
             OS        : {}\n\
             CPU USAGE : {:.1}%\n\
             RAM USAGE : {:.1}% ({:.2}GB / {:.2}GB)\n\
             UPTIME    : {hours}h {minutes}m\n\
             STATUS    : ONLINE",
            now.format("%Y-%m-%d %H:%M:%S"),
            self.os,
            self.cpu_percent,
            self.memory_percent(),
            self.memory_used as f64 / GIB,
            self.memory_total as f64 / GIB,
        )
    }
}

pub struct SystemStatsTool;

#[async_trait]
impl Tool for SystemStatsTool {
    fn name(&self) -> &str {
        "system_stats"
    }

    fn description(&self) -> &str {
        "Get current system status including CPU usage, memory usage, platform info, and time."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<String, ToolError> {
        let snapshot = tokio::task::spawn_blocking(SystemSnapshot::capture)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "system_stats".into(),
                reason: e.to_string(),
            })?;
        Ok(snapshot.report(Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn report_layout() {
        let snapshot = SystemSnapshot {
            os: "Linux 6.1.0".into(),
            cpu_percent: 12.5,
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_total: 8 * 1024 * 1024 * 1024,
            uptime_secs: 3 * 3600 + 25 * 60 + 9,
        };
        let now = Local.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let report = snapshot.report(now);

        assert!(report.starts_with("SYSTEM STATUS REPORT:\n---------------------\n"));
        assert!(report.contains("TIME      : 2026-03-01 09:30:00\n"));
        assert!(report.contains("OS        : Linux 6.1.0\n"));
        assert!(report.contains("CPU USAGE : 12.5%\n"));
        assert!(report.contains("RAM USAGE : 25.0% (2.00GB / 8.00GB)\n"));
        assert!(report.contains("UPTIME    : 3h 25m\n"));
        assert!(report.ends_with("STATUS    : ONLINE"));
    }

    #[test]
    fn zero_total_memory() {
        let snapshot = SystemSnapshot {
            os: String::new(),
            cpu_percent: 0.0,
            memory_used: 0,
            memory_total: 0,
            uptime_secs: 0,
        };
        assert_eq!(snapshot.memory_percent(), 0.0);
    }

    #[tokio::test]
    async fn execute_reports_live_host() {
        let out = SystemStatsTool.execute(Map::new()).await.unwrap();
        assert!(out.starts_with("SYSTEM STATUS REPORT:"));
        assert!(out.contains("STATUS    : ONLINE"));
    }
}
