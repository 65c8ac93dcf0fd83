use thiserror::Error;

use crate::models::TimerSettings;

pub const FIELD_LABELS: [&str; 4] = [
    "Pomodoro (minutes)",
    "Short Break (minutes)",
    "Long Break (minutes)",
    "Long Break Interval",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{0} must be a whole number (or M:SS for durations)")]
    NotANumber(&'static str),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{0} is too large")]
    TooLarge(&'static str),
}

/// 设置对话框, 时长以分钟编辑, 不足整分钟的时长显示为 M:SS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsForm {
    pub fields: [String; 4],
    pub focus: usize,
}

impl SettingsForm {
    pub fn from_settings(settings: &TimerSettings) -> Self {
        Self {
            fields: [
                duration_field(settings.pomodoro_time),
                duration_field(settings.short_break_time),
                duration_field(settings.long_break_time),
                settings.long_break_interval.to_string(),
            ],
            focus: 0,
        }
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn previous_field(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn push(&mut self, c: char) {
        self.fields[self.focus].push(c);
    }

    pub fn pop(&mut self) {
        self.fields[self.focus].pop();
    }

    /// 校验并转换为秒, 已完成的番茄数沿用 current
    pub fn parse(&self, current: &TimerSettings) -> Result<TimerSettings, FormError> {
        let seconds = |index: usize| duration_seconds(&self.fields[index], FIELD_LABELS[index]);

        Ok(TimerSettings {
            pomodoro_time: seconds(0)?,
            short_break_time: seconds(1)?,
            long_break_time: seconds(2)?,
            long_break_interval: positive(&self.fields[3], FIELD_LABELS[3])?,
            pomodoro_count: current.pomodoro_count,
        })
    }
}

fn duration_field(seconds: u64) -> String {
    if seconds % 60 == 0 {
        (seconds / 60).to_string()
    } else {
        format!("{}:{:02}", seconds / 60, seconds % 60)
    }
}

/// "M" 或 "M:SS" 转换为秒
fn duration_seconds(raw: &str, label: &'static str) -> Result<u64, FormError> {
    let (minutes, seconds) = match raw.trim().split_once(':') {
        Some((minutes, seconds)) => {
            let seconds = seconds
                .parse::<u64>()
                .ok()
                .filter(|s| *s < 60)
                .ok_or(FormError::NotANumber(label))?;
            let minutes: u64 = minutes.parse().map_err(|_| FormError::NotANumber(label))?;
            (minutes, seconds)
        }
        None => (positive(raw, label)?, 0),
    };

    let total = minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or(FormError::TooLarge(label))?;
    if total == 0 {
        return Err(FormError::NotPositive(label));
    }
    Ok(total)
}

fn positive(raw: &str, label: &'static str) -> Result<u64, FormError> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| FormError::NotANumber(label))?;
    if value == 0 {
        return Err(FormError::NotPositive(label));
    }
    Ok(value)
}
