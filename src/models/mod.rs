use chrono::{DateTime, Local, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize};

pub const DEFAULT_POMODORO_TIME: u64 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_TIME: u64 = 5 * 60;
pub const DEFAULT_LONG_BREAK_TIME: u64 = 15 * 60;
pub const DEFAULT_LONG_BREAK_INTERVAL: u64 = 4;

/// 计时模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub const ALL: [TimerMode; 3] = [
        TimerMode::Pomodoro,
        TimerMode::ShortBreak,
        TimerMode::LongBreak,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimerMode::Pomodoro => "Pomodoro",
            TimerMode::ShortBreak => "Short Break",
            TimerMode::LongBreak => "Long Break",
        }
    }
}

/// 计时设置, 时长单位为秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    pub pomodoro_time: u64,
    pub short_break_time: u64,
    pub long_break_time: u64,
    pub long_break_interval: u64,
    pub pomodoro_count: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            pomodoro_time: DEFAULT_POMODORO_TIME,
            short_break_time: DEFAULT_SHORT_BREAK_TIME,
            long_break_time: DEFAULT_LONG_BREAK_TIME,
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
            pomodoro_count: 0,
        }
    }
}

impl TimerSettings {
    /// 指定模式的时长 (秒)
    pub fn duration(&self, mode: TimerMode) -> u64 {
        match mode {
            TimerMode::Pomodoro => self.pomodoro_time,
            TimerMode::ShortBreak => self.short_break_time,
            TimerMode::LongBreak => self.long_break_time,
        }
    }

    /// 所有时长与长休息间隔都必须为正
    pub fn is_valid(&self) -> bool {
        self.pomodoro_time > 0
            && self.short_break_time > 0
            && self.long_break_time > 0
            && self.long_break_interval > 0
    }
}

/// 任务数据模型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub completed: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: NaiveDateTime,
}

impl Task {
    /// 名称去除首尾空白, 为空时返回 None
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            completed: false,
            created_at: Local::now().naive_local(),
        })
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// 解析 ISO-8601 时间戳; 带时区偏移的换算为本地时间
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Local).naive_local()),
        Err(_) => raw.parse().ok(),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {:?}", raw)))
}
