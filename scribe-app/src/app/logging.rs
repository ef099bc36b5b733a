use scribe_core::directory::Directory;
use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::WorkerGuard;

/// File logging at debug for our crates plus an stderr layer driven by
/// `SCRIBE_LOG` (off unless set, the REPL owns stdout).
#[inline(always)]
pub(super) fn logging() -> Option<WorkerGuard> {
    use tracing_subscriber::{filter, fmt, prelude::*};

    let (log_file, guard) = match Directory::logs_directory()
        .ok()
        .and_then(|dir| {
            tracing_appender::rolling::Builder::new()
                .max_log_files(10)
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("scribe")
                .filename_suffix("log")
                .build(dir)
                .ok()
        })
        .map(tracing_appender::non_blocking)
    {
        Some((log_file, guard)) => (Some(log_file), Some(guard)),
        None => (None, None),
    };

    let log_file_filter = filter::Targets::new()
        .with_target("scribe_app", LevelFilter::DEBUG)
        .with_target("scribe_proxy", LevelFilter::DEBUG)
        .with_target("scribe_rpc", LevelFilter::DEBUG)
        .with_default(LevelFilter::INFO);

    let console_filter = std::env::var("SCRIBE_LOG")
        .unwrap_or_default()
        .parse::<filter::Targets>()
        .unwrap_or_default();

    let file_layer = log_file.map(|log_file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(log_file)
            .with_filter(log_file_filter)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_target(true)
                .with_thread_names(true)
                .with_filter(console_filter),
        )
        .init();

    guard
}

pub(super) fn panic_hook() {
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("main");
        let backtrace = backtrace::Backtrace::new();

        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown>"
        };

        match info.location() {
            Some(loc) => {
                error!(
                    target: "scribe_app::panic_hook",
                    "thread {thread} panicked at {} | file://./{}:{}:{}\n{:?}",
                    payload,
                    loc.file(), loc.line(), loc.column(),
                    backtrace,
                );
            }
            None => {
                error!(
                    target: "scribe_app::panic_hook",
                    "thread {thread} panicked at {}\n{:?}",
                    payload,
                    backtrace,
                );
            }
        }

        eprintln!("thread {thread} panicked: {payload}");
    }))
}
