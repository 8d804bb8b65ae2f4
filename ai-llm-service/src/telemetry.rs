use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Crate target prefix used to filter only library-originated logs.
pub const TARGET_PREFIX: &str = "ai_llm_service";

/// HTTP internals that are chatty at `info`/`debug`.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "tonic", "rustls"];

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
pub struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        w.write_str(&now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// Build a **library-scoped** formatting layer that renders ONLY events emitted by this crate.
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with `file:line`
/// - ANSI colors only when stderr is a terminal
///
/// Compose it in the binary together with the global subscriber.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stderr().is_terminal();
    let only_this_crate = filter::filter_fn(|meta| meta.target().starts_with(TARGET_PREFIX));

    fmt::layer()
        .with_writer(io::stderr)
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_ansi(use_ansi)
        .event_format(fmt::format().compact().with_source_location(true))
        .with_filter(only_this_crate)
}

/// Level directive for **this** library only, e.g. `ai_llm_service=debug`.
pub fn level_directive(level: Level) -> Directive {
    let s = format!("{TARGET_PREFIX}={}", level.as_str().to_lowercase());
    s.parse()
        .unwrap_or_else(|_| Directive::from(LevelFilter::from_level(level)))
}

/// Filter from `RUST_LOG` (or `default`), with HTTP internals capped at `warn`
/// and this library at `level`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    for target in NOISY_TARGETS {
        if let Ok(d) = format!("{target}=warn").parse::<Directive>() {
            filter = filter.add_directive(d);
        }
    }
    filter.add_directive(level_directive(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_targets_this_crate() {
        assert_eq!(
            level_directive(Level::DEBUG).to_string().to_lowercase(),
            "ai_llm_service=debug"
        );
    }
}
