use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter};

const WORKSPACE_CRATES: &[&str] = &["drawdeck", "drawdeck_collab", "drawdeck_server"];

/// Sets up the process-wide logger. Workspace crates log at info and
/// above, external crates only at warn and above.
pub fn init_logger() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_label(record.level()),
                chrono::Local::now()
                    .format("%H:%M:%S")
                    .to_string()
                    .bright_black(),
                target_label(record.target()),
                message
            ))
        })
        .level(LevelFilter::Warn);

    for target in WORKSPACE_CRATES {
        dispatch = dispatch.level_for(*target, LevelFilter::Info);
    }

    dispatch
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized")
}

fn target_label(target: &str) -> ColoredString {
    match target.split("::").next().unwrap_or_default() {
        "drawdeck_collab" => "COLLAB".bright_purple(),
        "drawdeck_server" => "SERVER".bright_green(),
        "drawdeck" => "APP".blue(),
        other => other.clear(),
    }
}

fn level_label(level: Level) -> ColoredString {
    match level {
        Level::Error => " ERR ".black().on_red().bold(),
        Level::Warn => " WRN ".black().on_yellow().bold(),
        Level::Info => " INF ".black().on_blue().bold(),
        Level::Debug => " DBG ".white().on_black(),
        Level::Trace => " TRC ".clear(),
    }
}
