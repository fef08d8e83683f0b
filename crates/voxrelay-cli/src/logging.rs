//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use voxrelay_core::config::LoggingConfig;

/// Filter directives: `RUST_LOG` wins, then `--verbose`, then the config level and filters.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level)
        .chain(config.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn init(config: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config, verbose)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (config.format.as_str(), config.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config, false), "info");
        assert_eq!(filter_directives(&config, true), "debug");

        config.level = Some("warn".into());
        config.filters = vec!["voxrelay_gateway=trace".into(), "hyper=off".into()];
        assert_eq!(
            filter_directives(&config, false),
            "warn,voxrelay_gateway=trace,hyper=off"
        );
    }
}
