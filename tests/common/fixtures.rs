//! Canned fleets and log contents used across harnesses.

use fleetlog_core::ExecError;

use crate::common::fake_transport::FakeHost;

/// 2024-01-15T10:00:00Z
pub const T0: i64 = 1_705_312_800;

/// `hits` lines containing "error" interleaved with `hits` lines without.
pub fn error_lines(hits: usize) -> Vec<String> {
    (0..hits)
        .flat_map(|i| {
            [
                format!("2024-01-15 10:{:02}:00 INFO request {i} served", i % 60),
                format!("2024-01-15 10:{:02}:01 ERROR upstream error on request {i}", i % 60),
            ]
        })
        .collect()
}

/// Lines with no "error" anywhere.
pub fn quiet_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("2024-01-15 11:{:02}:00 INFO heartbeat {i}", i % 60))
        .collect()
}

/// A typical healthy host: three files, a directory and two units.
pub fn healthy_host() -> FakeHost {
    FakeHost::new()
        .file_with_content("syslog", T0 + 300, error_lines(3))
        .file_with_content("auth.log", T0 + 200, quiet_lines(4))
        .file_with_content("kern.log.1.gz", T0 + 100, error_lines(1))
        .directory("nginx")
        .unit_with_lines("sshd.service", &["Accepted publickey for ops", "error: kex_exchange_identification"])
        .unit("cron.service")
}

/// A host whose ssh connection never succeeds.
pub fn unreachable_host() -> FakeHost {
    FakeHost::new().unreachable(ExecError::ConnectionTimeout(
        "ssh: connect to host db1.internal port 22: Connection timed out".to_string(),
    ))
}

/// `count` files named `app-NN.log`, `app-00.log` being the oldest.
pub fn many_files(count: usize) -> FakeHost {
    (0..count).fold(FakeHost::new(), |host, i| {
        host.file(&format!("app-{i:02}.log"), 100 + i as u64, T0 + i as i64 * 60)
    })
}
