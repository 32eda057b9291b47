use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor};

/// 日志级别覆盖使用的环境变量，语法同 `RUST_LOG`
pub const LOG_ENV: &str = "XENON_LOG";

/// 默认使用 Info 级别，可以通过 [`LOG_ENV`] 覆盖
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

/// 重复调用时只有第一次生效
pub fn init_log_with_level(level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let level = record.level();
            let mut level_style = buf.default_level_style(level);
            if let Some(color) = level_color(level) {
                level_style = level_style.fg_color(Some(color));
            }
            let dim_style = anstyle::Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));

            let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            // UI 线程以及 guest output 线程会交替输出
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("-");

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {dim_style}[{thread_name}][{file}:{line}]{dim_style:#} {}",
                record.args()
            )
        })
        .filter(None, level)
        .parse_env(LOG_ENV)
        .try_init();

    if let Err(e) = result {
        log::debug!("logger already initialized: {}", e);
    }
}

/// Debug 以及 Trace 使用 env_logger 的默认颜色
pub fn level_color(level: log::Level) -> Option<Color> {
    match level {
        log::Level::Error => Some(Color::Ansi(AnsiColor::Red)),
        log::Level::Warn => Some(Color::Ansi(AnsiColor::Yellow)),
        log::Level::Info => Some(Color::Ansi(AnsiColor::Green)),
        log::Level::Debug | log::Level::Trace => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_color() {
        assert_eq!(level_color(log::Level::Error), Some(Color::Ansi(AnsiColor::Red)));
        assert_eq!(level_color(log::Level::Trace), None);
    }

    #[test]
    fn test_init_twice() {
        init_log_with_level(log::LevelFilter::Debug);
        init_log();
        log::info!("logger works after repeated init");
    }
}
