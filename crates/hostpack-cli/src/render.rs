use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use hostpack_installer::InstallationStorage;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let (badge, badge_style) = status_badge(status);
            format!("{} {message}", colorize(badge_style, badge))
        }
    }
}

fn status_badge(status: &str) -> (&'static str, Style) {
    match status {
        "ok" => ("[OK]", badge_style(AnsiColor::BrightGreen)),
        "warn" => ("[WARN]", badge_style(AnsiColor::BrightYellow)),
        "err" => ("[ERR]", badge_style(AnsiColor::BrightRed)),
        _ => ("[..]", badge_style(AnsiColor::BrightCyan)),
    }
}

fn badge_style(color: AnsiColor) -> Style {
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_doctor_lines(
    style: OutputStyle,
    storage: &InstallationStorage,
    schemes: &[String],
    command_state: Option<&str>,
) -> Vec<String> {
    let mut lines = Vec::new();
    if style == OutputStyle::Rich {
        lines.push(colorize(section_style(), "== installation =="));
    }
    lines.push(format!("root: {}", storage.root().display()));
    lines.push(format!("layout: {}", storage.state().as_str()));
    for (label, path) in [
        ("conf", storage.cfg_dir()),
        ("packages", storage.pkgrepo_dir()),
        ("state", storage.state_dir()),
        ("work", storage.work_dir()),
        ("run", storage.run_dir()),
        ("log", storage.log_dir()),
        ("tmp", storage.tmp_dir()),
        ("bin", storage.bin_dir()),
        ("lib", storage.lib_dir()),
    ] {
        lines.push(format!("{label}: {}", path.display()));
    }
    lines.push(format!("distribution storage schemes: {}", schemes.join(", ")));

    match command_state {
        Some(state) => lines.push(render_status_line(
            style,
            "warn",
            &format!("command state: {} (interrupted command)", state.trim_end()),
        )),
        None => lines.push("command state: none".to_string()),
    }
    lines
}
