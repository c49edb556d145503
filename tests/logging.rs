// tests/logging.rs

use clusterdag::cli::LogLevel;
use clusterdag::logging::filter_directive;

#[test]
fn flag_beats_environment() {
    assert_eq!(filter_directive(Some(LogLevel::Trace), Some("warn")), "trace");
    assert_eq!(filter_directive(Some(LogLevel::Warn), None), "warn");
}

#[test]
fn environment_directives_pass_through() {
    assert_eq!(
        filter_directive(None, Some(" clusterdag::engine=debug,warn ")),
        "clusterdag::engine=debug,warn"
    );
}

#[test]
fn missing_environment_falls_back_to_info() {
    assert_eq!(filter_directive(None, None), "info");
    assert_eq!(filter_directive(None, Some("  ")), "info");
}
