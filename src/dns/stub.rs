//! Text transforms for the systemd-resolved stub listener handover, and the
//! consistency check between the recorded state and the marker file.

use crate::config::StubState;
use std::fmt;
use std::path::Path;

const DIRECTIVE: &str = "DNSStubListener=";
const SECTION: &str = "[Resolve]";

pub const MANAGED_HEADER: &str = "# Managed by PHPark\n";

/// Public resolvers used when systemd-resolved has not published its
/// upstream list yet.
pub const FALLBACK_SERVERS: &[&str] = &["8.8.8.8", "1.1.1.1"];

fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with(DIRECTIVE)
}

/// Set (`Some`) or clear (`None`) the `DNSStubListener=` directive in
/// resolved.conf text, leaving every other line as it was.
///
/// Setting replaces an active directive line if there is one, else inserts
/// right after `[Resolve]`, else appends a new `[Resolve]` section.
/// Commented-out lines are never treated as the directive.
pub fn set_stub_listener(content: &str, value: Option<&str>) -> String {
    let Some(value) = value else {
        return content
            .split('\n')
            .filter(|line| !is_directive(line))
            .collect::<Vec<_>>()
            .join("\n");
    };

    let setting = format!("{DIRECTIVE}{value}");
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    if lines.iter().any(|l| is_directive(l)) {
        for line in lines.iter_mut().filter(|l| is_directive(l)) {
            *line = setting.clone();
        }
        return lines.join("\n");
    }

    if let Some(index) = lines.iter().position(|l| l.trim() == SECTION) {
        lines.insert(index + 1, setting);
        return lines.join("\n");
    }

    let mut out = content.to_string();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(SECTION);
    out.push('\n');
    out.push_str(&setting);
    out.push('\n');
    out
}

/// True when an active directive already turns the stub listener off.
pub fn stub_listener_disabled(content: &str) -> bool {
    content
        .lines()
        .filter(|l| is_directive(l))
        .any(|l| l.trim()[DIRECTIVE.len()..].trim() == "no")
}

/// dnsmasq upstream configuration. Reading the live list that
/// systemd-resolved publishes keeps DHCP and VPN nameservers working; the
/// fixed servers are only used until that file appears.
pub fn upstream_conf(upstream: &Path) -> String {
    if upstream.exists() {
        format!("{MANAGED_HEADER}resolv-file={}\n", upstream.display())
    } else {
        let mut conf = MANAGED_HEADER.to_string();
        for server in FALLBACK_SERVERS {
            conf.push_str(&format!("server={server}\n"));
        }
        conf
    }
}

/// Replacement for `/etc/resolv.conf` sending every lookup to dnsmasq.
pub fn loopback_resolv_conf() -> String {
    format!("{MANAGED_HEADER}nameserver {}\n", super::LOOPBACK)
}

/// Agreement between the recorded stub state and the marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCheck {
    Consistent(StubState),
    /// The marker is authoritative; the record is stale.
    Desync {
        recorded: StubState,
        marker_present: bool,
    },
}

impl StubCheck {
    /// State to act on. The marker decides.
    pub fn effective(&self) -> StubState {
        match *self {
            StubCheck::Consistent(state) => state,
            StubCheck::Desync { marker_present, .. } => marker_state(marker_present),
        }
    }

    pub fn is_desync(&self) -> bool {
        matches!(self, StubCheck::Desync { .. })
    }
}

impl fmt::Display for StubCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubCheck::Consistent(state) => write!(f, "{state}"),
            StubCheck::Desync {
                recorded,
                marker_present,
            } => write!(
                f,
                "out of sync (recorded {recorded}, marker {})",
                if *marker_present { "present" } else { "absent" }
            ),
        }
    }
}

fn marker_state(marker_present: bool) -> StubState {
    if marker_present {
        StubState::Disabled
    } else {
        StubState::Enabled
    }
}

impl StubState {
    /// Compare the recorded state with what the marker file says. A mismatch
    /// is reported, never repaired here.
    pub fn reconcile(recorded: StubState, marker_present: bool) -> StubCheck {
        if recorded == marker_state(marker_present) {
            StubCheck::Consistent(recorded)
        } else {
            StubCheck::Desync {
                recorded,
                marker_present,
            }
        }
    }
}
