//! systemd unit state for nginx, the FPM pools and the resolvers.

use crate::process::{run_checked, CommandRunner};
use crate::report::Report;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub const NGINX: &str = "nginx";

/// `systemctl is-active` succeeds only for an active unit.
pub fn is_active(runner: &dyn CommandRunner, unit: &str) -> bool {
    match runner.run("systemctl", &["is-active", unit]) {
        Ok(output) => output.success && output.stdout.trim() == "active",
        Err(e) => {
            debug!(unit, "is-active probe failed: {e:#}");
            false
        }
    }
}

/// Start `unit` unless it is already active, then try to enable it on boot.
///
/// A failed start aborts; a failed enable is only recorded.
pub fn ensure_running(runner: &dyn CommandRunner, unit: &str) -> Result<Report> {
    let mut report = Report::new();
    if is_active(runner, unit) {
        report.skipped(format!("start {unit}"), "already active");
        return Ok(report);
    }

    info!(unit, "starting service");
    run_checked(runner, "systemctl", &["start", unit])
        .with_context(|| format!("starting {unit}"))?;
    report.done(format!("start {unit}"));

    let enabled = run_checked(runner, "systemctl", &["enable", unit]);
    if report.advise(format!("enable {unit} on boot"), enabled) {
        debug!(unit, "enabled on boot");
    }
    Ok(report)
}

pub fn restart(runner: &dyn CommandRunner, unit: &str) -> Result<()> {
    info!(unit, "restarting service");
    run_checked(runner, "systemctl", &["restart", unit])
        .with_context(|| format!("restarting {unit}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, FakeRunner};
    use crate::report::Outcome;

    #[test]
    fn test_active_unit_is_skipped() {
        let fake = FakeRunner::new();
        fake.respond("systemctl is-active nginx", CommandOutput::ok("active\n"));

        let report = ensure_running(&fake, NGINX).unwrap();

        assert!(matches!(report.steps()[0].outcome, Outcome::Skipped(_)));
        assert_eq!(fake.count("systemctl start"), 0);
    }

    #[test]
    fn test_inactive_unit_is_started_and_enabled() {
        let fake = FakeRunner::new();
        fake.respond("systemctl is-active php8.2-fpm", CommandOutput::failed(3, "inactive\n"));

        let report = ensure_running(&fake, "php8.2-fpm").unwrap();

        assert_eq!(fake.count("systemctl start php8.2-fpm"), 1);
        assert_eq!(fake.count("systemctl enable php8.2-fpm"), 1);
        assert!(!report.has_advisories());
    }

    #[test]
    fn test_enable_failure_is_advisory() {
        let fake = FakeRunner::new();
        fake.respond("systemctl is-active nginx", CommandOutput::failed(3, "inactive\n"));
        fake.fail("systemctl enable nginx");

        let report = ensure_running(&fake, NGINX).unwrap();

        assert_eq!(report.advisories().count(), 1);
    }

    #[test]
    fn test_start_failure_is_fatal() {
        let fake = FakeRunner::new();
        fake.respond("systemctl is-active nginx", CommandOutput::failed(3, "inactive\n"));
        fake.fail("systemctl start nginx");

        assert!(ensure_running(&fake, NGINX).is_err());
        assert_eq!(fake.count("systemctl enable"), 0);
    }
}
