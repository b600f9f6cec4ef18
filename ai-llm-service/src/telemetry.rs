use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Log targets emitted by the relay's own crates.
pub const WORKSPACE_TARGETS: [&str; 4] = ["ai_llm_service", "rag_base", "api", "kb_chat_relay"];

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// `true` when `target` belongs to one of [`WORKSPACE_TARGETS`].
pub fn is_workspace_target(target: &str) -> bool {
    WORKSPACE_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// Formatting layer that renders ONLY events emitted by the workspace crates.
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with target and `file:line`
/// - Span close events (durations of `#[instrument]`ed provider calls)
/// - ANSI colors only when stdout is a terminal
///
/// Uses a per-layer filter, so it does not affect logs from other crates.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();
    let only_workspace = filter::filter_fn(|meta| is_workspace_target(meta.target()));

    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(use_ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(fmt::format().compact().with_source_location(true))
        .with_filter(only_workspace)
}

/// Plain layer for everything outside the workspace (hyper, reqwest, ...).
pub fn foreign_layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_target(true)
        .with_ansi(io::stdout().is_terminal())
        .with_filter(filter::filter_fn(|meta| !is_workspace_target(meta.target())))
}

/// Level directives for every workspace crate, e.g. `rag_base=debug`.
pub fn level_directives(level: Level) -> Vec<Directive> {
    WORKSPACE_TARGETS
        .iter()
        .filter_map(|target| {
            Directive::from_str(&format!("{target}={}", level.as_str().to_lowercase())).ok()
        })
        .collect()
}

/// `RUST_LOG` (or `default` when unset/invalid) plus `level` for the
/// workspace crates.
///
/// Directives already present in `RUST_LOG` for a workspace crate are
/// overridden by `level`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    level_directives(level)
        .into_iter()
        .fold(base, |filter, directive| filter.add_directive(directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_targets_match_module_paths() {
        assert!(is_workspace_target("rag_base::retrieve"));
        assert!(is_workspace_target("api"));
        assert!(is_workspace_target("ai_llm_service::services::ollama_service"));
        assert!(!is_workspace_target("apis_other"));
        assert!(!is_workspace_target("hyper::proto"));
    }

    #[test]
    fn one_directive_per_crate() {
        let d = level_directives(Level::DEBUG);
        assert_eq!(d.len(), WORKSPACE_TARGETS.len());
        assert_eq!(d[1].to_string(), "rag_base=debug");
    }
}
