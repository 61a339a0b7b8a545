use std::path::Path;
use std::time::SystemTime;

/// `<rfc3339> LEVEL module:line message`, one record per line.
fn format_line(at: SystemTime, record: &log::Record) -> String {
    let module = record.module_path().unwrap_or_else(|| record.target());
    let location = match record.line() {
        Some(line) => format!("{}:{}", module, line),
        None => module.to_string(),
    };
    format!(
        "{} {:<5} {} {}",
        humantime::format_rfc3339_millis(at),
        record.level(),
        location,
        record.args()
    )
}

/// Route `log` output to a file; the terminal belongs to the UI. Our own
/// modules log down to trace, dependencies only warnings and up.
pub fn init(filepath: &Path) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, _message, record| {
            out.finish(format_args!("{}", format_line(SystemTime::now(), record)))
        })
        .level(log::LevelFilter::Warn)
        .level_for(env!("CARGO_CRATE_NAME"), log::LevelFilter::Trace)
        .chain(fern::log_file(filepath)?)
        .apply()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_line_names_module_and_line() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_500);
        let line = format_line(
            at,
            &log::Record::builder()
                .args(format_args!("students: created abc"))
                .level(log::Level::Debug)
                .target("school_lms::api::store")
                .module_path(Some("school_lms::api::store"))
                .line(Some(42))
                .build(),
        );
        assert_eq!(
            line,
            "1970-01-01T00:00:01.500Z DEBUG school_lms::api::store:42 students: created abc"
        );
    }

    #[test]
    fn test_line_falls_back_to_target() {
        let line = format_line(
            SystemTime::UNIX_EPOCH,
            &log::Record::builder()
                .args(format_args!("feed released"))
                .level(log::Level::Warn)
                .target("school_lms::sync")
                .build(),
        );
        assert!(line.ends_with(" WARN  school_lms::sync feed released"));
    }
}
