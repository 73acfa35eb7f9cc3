//! Logging init and the per-arc log file layout.
//!
//! One `tracing-subscriber` registry with two layers: a plain `fmt` layer on
//! stderr, `RUST_LOG`-driven via `EnvFilter` (teacher's
//! `skynet_gateway=info,tower_http=debug` idiom), and [`ArcFileLayer`], which
//! routes every event inside an [`arc_span`] to its own file under
//! `logs/<YYYY-MM-DD>/<arc>/<time>-<nick>-<preview>.log`, with everything
//! outside an arc span falling back to `logs/<YYYY-MM-DD>/system.log`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::span::Attributes;
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initialise the global subscriber: stderr `fmt` layer + per-arc file
/// routing under `base_dir`. Call once at process startup.
pub fn init(base_dir: impl Into<PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let arc_layer = ArcFileLayer::new(base_dir);

    tracing_subscriber::registry().with(filter).with(fmt_layer).with(arc_layer).init();
}

/// Builds the span used to scope one message pipeline's logging to its own
/// file. Wrap the pipeline future in `.instrument(arc_span(...))`.
pub fn arc_span(arc: &str, nick: &str, content_preview: &str) -> tracing::Span {
    let preview = sanitise_preview(content_preview);
    tracing::info_span!("message_pipeline", arc = %arc, nick = %nick, preview = %preview)
}

fn sanitise_preview(content: &str) -> String {
    content
        .chars()
        .take(24)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

struct ArcFieldVisitor {
    arc: Option<String>,
    nick: Option<String>,
    preview: Option<String>,
}

impl ArcFieldVisitor {
    fn new() -> Self {
        Self { arc: None, nick: None, preview: None }
    }
}

impl Visit for ArcFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_field(field.name(), format!("{value:?}"));
    }
}

impl ArcFieldVisitor {
    fn record_field(&mut self, name: &str, value: String) {
        match name {
            "arc" => self.arc = Some(value),
            "nick" => self.nick = Some(value),
            "preview" => self.preview = Some(value),
            "message" => {}
            _ => {}
        }
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// File handle cached on a span's extensions once its per-arc log path has
/// been opened, so repeated events inside the same span reuse one `File`.
struct ArcLogFile(Mutex<File>);

/// Routes events to a per-arc file when inside an [`arc_span`]; otherwise to
/// the day's `system.log`.
pub struct ArcFileLayer {
    base_dir: PathBuf,
    system_log: Mutex<Option<(String, File)>>,
}

impl ArcFileLayer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), system_log: Mutex::new(None) }
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    fn open_arc_file(&self, arc: &str, nick: &str, preview: &str) -> std::io::Result<File> {
        let day = Self::today();
        let dir = self.base_dir.join(&day).join(sanitise_path_segment(arc));
        fs::create_dir_all(&dir)?;
        let time = chrono::Utc::now().format("%H%M%S");
        let filename = format!("{time}-{}-{}.log", sanitise_path_segment(nick), preview);
        OpenOptions::new().create(true).append(true).open(dir.join(filename))
    }

    fn write_system_log(&self, line: &str) {
        let day = Self::today();
        let mut guard = self.system_log.lock().unwrap();
        let needs_reopen = match guard.as_ref() {
            Some((d, _)) => d != &day,
            None => true,
        };
        if needs_reopen {
            if let Ok(()) = fs::create_dir_all(&self.base_dir.join(&day)) {
                if let Ok(file) =
                    OpenOptions::new().create(true).append(true).open(self.base_dir.join(&day).join("system.log"))
                {
                    *guard = Some((day, file));
                }
            }
        }
        if let Some((_, file)) = guard.as_mut() {
            let _ = writeln!(file, "{line}");
        }
    }
}

fn sanitise_path_segment(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '#' { c } else { '_' }).collect()
}

impl<S> Layer<S> for ArcFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != "message_pipeline" {
            return;
        }
        let mut visitor = ArcFieldVisitor::new();
        attrs.record(&mut visitor);
        let (Some(arc), Some(nick), Some(preview)) = (visitor.arc, visitor.nick, visitor.preview) else {
            return;
        };
        if let Ok(file) = self.open_arc_file(&arc, &nick, &preview) {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(ArcLogFile(Mutex::new(file)));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        let line = format!(
            "{} {} {}: {}",
            chrono::Utc::now().to_rfc3339(),
            event.metadata().level(),
            event.metadata().target(),
            message.0
        );

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(log_file) = span.extensions().get::<ArcLogFile>() {
                    let mut file = log_file.0.lock().unwrap();
                    let _ = writeln!(file, "{line}");
                    return;
                }
            }
        }

        self.write_system_log(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_ascii_alphanumeric_and_truncated() {
        let preview = sanitise_preview("hello, world! 123 longer than twenty four chars");
        assert_eq!(preview.chars().count(), 24);
        assert!(preview.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn path_segment_keeps_hash_and_dash() {
        assert_eq!(sanitise_path_segment("discord#general"), "discord#general");
        assert_eq!(sanitise_path_segment("weird/name"), "weird_name");
    }
}
