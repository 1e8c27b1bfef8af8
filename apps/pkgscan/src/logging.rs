//! Diagnostic logging on stderr via `tracing-subscriber`.
//!
//! Filter priority: `PKGSCAN_LOG` > `RUST_LOG` > the `-v` default.

use tracing_subscriber::EnvFilter;

/// Directive used when no environment filter is set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,pkgscan=debug"
    } else {
        "pkgscan=warn"
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    if let Ok(directives) = std::env::var("PKGSCAN_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(default_directive(verbose))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_writer(std::io::stderr)
        .without_time()
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_directive(verbose)).is_ok());
        }
        init(false);
        init(true);
    }
}
