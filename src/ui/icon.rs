use ratatui::style::Color;

use crate::models::TimerMode;

/// 菜单栏图标的替代: 每种模式一个纯色标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeIcon {
    pub glyph: &'static str,
    pub color: Color,
}

pub fn render_icon(mode: TimerMode) -> ModeIcon {
    match mode {
        TimerMode::Pomodoro => ModeIcon {
            glyph: "🍅",
            color: Color::Rgb(255, 0, 0),
        },
        TimerMode::ShortBreak => ModeIcon {
            glyph: "●",
            color: Color::Rgb(0, 127, 255),
        },
        TimerMode::LongBreak => ModeIcon {
            glyph: "●",
            color: Color::Rgb(0, 200, 100),
        },
    }
}
