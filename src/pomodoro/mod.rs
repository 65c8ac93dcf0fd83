use crate::models::{TimerMode, TimerSettings};

/// 一次倒计时结束后需要执行的副作用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub finished: TimerMode,
    pub next: TimerMode,
    pub title: &'static str,
    pub body: &'static str,
}

/// tick 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 未在计时, 忽略
    Idle,
    /// 仍在倒计时, 携带剩余秒数
    Counting(u64),
    Completed(Completion),
}

/// 番茄钟计时器
#[derive(Debug, Clone)]
pub struct PomodoroTimer {
    pub settings: TimerSettings,
    pub mode: TimerMode,
    pub remaining_seconds: u64,
    pub running: bool,
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new(TimerSettings::default())
    }
}

impl PomodoroTimer {
    pub fn new(settings: TimerSettings) -> Self {
        Self {
            remaining_seconds: settings.duration(TimerMode::Pomodoro),
            settings,
            mode: TimerMode::Pomodoro,
            running: false,
        }
    }

    /// 开始计时, 已在计时则返回 false
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// 暂停
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// 停止并恢复当前模式的完整时长
    pub fn reset(&mut self) {
        self.running = false;
        self.remaining_seconds = self.settings.duration(self.mode);
    }

    pub fn set_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.reset();
    }

    /// 应用新的时长设置, 保留已完成的番茄数
    pub fn apply_settings(&mut self, settings: TimerSettings) {
        self.settings = TimerSettings {
            pomodoro_count: self.settings.pomodoro_count,
            ..settings
        };
        self.reset();
    }

    /// 减少一秒, 归零时执行完成切换
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Counting(self.remaining_seconds);
        }

        TickOutcome::Completed(self.complete())
    }

    fn complete(&mut self) -> Completion {
        self.running = false;
        let finished = self.mode;

        let (next, title, body) = match finished {
            TimerMode::Pomodoro => {
                self.settings.pomodoro_count = self.settings.pomodoro_count.saturating_add(1);
                // 间隔为 0 视为配置错误, 按 1 处理
                let interval = self.settings.long_break_interval.max(1);
                let next = if self.settings.pomodoro_count % interval == 0 {
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                };
                (next, "Pomodoro Completed", "Time to take a break!")
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => {
                (TimerMode::Pomodoro, "Break Completed", "Time to focus!")
            }
        };

        self.set_mode(next);

        Completion {
            finished,
            next,
            title,
            body,
        }
    }

    /// 获取进度百分比
    pub fn progress(&self) -> f32 {
        let total = self.settings.duration(self.mode);
        if total == 0 {
            return 0.0;
        }
        let elapsed = total.saturating_sub(self.remaining_seconds);
        (elapsed as f32 / total as f32) * 100.0
    }

    /// 格式化剩余时间
    pub fn format_remaining(&self) -> String {
        format_remaining(self.remaining_seconds)
    }
}

/// 秒数格式化为 MM:SS, 分钟不进位到小时
pub fn format_remaining(seconds: u64) -> String {
    let minutes = seconds / 60;
    let seconds = seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_completion(timer: &mut PomodoroTimer) -> Completion {
        assert!(timer.start());
        loop {
            match timer.tick() {
                TickOutcome::Completed(completion) => return completion,
                TickOutcome::Counting(_) => {}
                TickOutcome::Idle => panic!("timer stopped before completing"),
            }
        }
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(65), "01:05");
        assert_eq!(format_remaining(3661), "61:01");
        assert_eq!(PomodoroTimer::default().format_remaining(), "25:00");
    }

    #[test]
    fn test_new_timer_starts_in_pomodoro_mode() {
        let timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 90,
            ..Default::default()
        });
        assert_eq!(timer.mode, TimerMode::Pomodoro);
        assert_eq!(timer.remaining_seconds, 90);
        assert!(!timer.running);
    }

    #[test]
    fn test_start_is_noop_when_running() {
        let mut timer = PomodoroTimer::default();
        assert!(timer.start());
        assert!(!timer.start());
        assert!(timer.running);
    }

    #[test]
    fn test_ticks_never_increase_or_go_negative() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 5,
            short_break_time: 3,
            ..Default::default()
        });
        timer.start();

        let mut previous = timer.remaining_seconds;
        for _ in 0..4 {
            timer.tick();
            assert!(timer.remaining_seconds <= previous);
            previous = timer.remaining_seconds;
        }
        assert_eq!(timer.remaining_seconds, 1);

        // 完成后停止, 后续 tick 被忽略
        assert!(matches!(timer.tick(), TickOutcome::Completed(_)));
        let after = timer.remaining_seconds;
        for _ in 0..10 {
            assert_eq!(timer.tick(), TickOutcome::Idle);
            assert_eq!(timer.remaining_seconds, after);
        }
    }

    #[test]
    fn test_pause_is_idempotent() {
        let mut timer = PomodoroTimer::default();
        timer.start();
        timer.tick();
        timer.tick();

        timer.pause();
        let once = (timer.running, timer.remaining_seconds);
        timer.pause();
        assert_eq!((timer.running, timer.remaining_seconds), once);
        assert_eq!(timer.remaining_seconds, 1498);
    }

    #[test]
    fn test_tick_ignored_while_paused() {
        let mut timer = PomodoroTimer::default();
        assert_eq!(timer.tick(), TickOutcome::Idle);
        assert_eq!(timer.remaining_seconds, 1500);
    }

    #[test]
    fn test_reset_keeps_mode() {
        let mut timer = PomodoroTimer::default();
        timer.set_mode(TimerMode::LongBreak);
        timer.start();
        timer.tick();
        timer.reset();
        assert_eq!(timer.mode, TimerMode::LongBreak);
        assert_eq!(timer.remaining_seconds, 900);
        assert!(!timer.running);
    }

    #[test]
    fn test_fourth_pomodoro_selects_long_break() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 3,
            pomodoro_count: 3,
            long_break_interval: 4,
            ..Default::default()
        });

        let completion = run_to_completion(&mut timer);
        assert_eq!(completion.finished, TimerMode::Pomodoro);
        assert_eq!(completion.next, TimerMode::LongBreak);
        assert_eq!(completion.title, "Pomodoro Completed");
        assert_eq!(timer.settings.pomodoro_count, 4);
        assert_eq!(timer.mode, TimerMode::LongBreak);
        assert_eq!(timer.remaining_seconds, 900);
    }

    #[test]
    fn test_third_pomodoro_selects_short_break() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 3,
            pomodoro_count: 2,
            long_break_interval: 4,
            ..Default::default()
        });

        run_to_completion(&mut timer);
        assert_eq!(timer.settings.pomodoro_count, 3);
        assert_eq!(timer.mode, TimerMode::ShortBreak);
    }

    #[test]
    fn test_break_returns_to_pomodoro() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            short_break_time: 2,
            pomodoro_count: 7,
            ..Default::default()
        });
        timer.set_mode(TimerMode::ShortBreak);

        let completion = run_to_completion(&mut timer);
        assert_eq!(completion.next, TimerMode::Pomodoro);
        assert_eq!(completion.body, "Time to focus!");
        assert_eq!(timer.settings.pomodoro_count, 7);
        assert_eq!(timer.remaining_seconds, 1500);
    }

    #[test]
    fn test_completed_count_saturates() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 1,
            pomodoro_count: u64::MAX,
            ..Default::default()
        });

        let completion = run_to_completion(&mut timer);
        assert_eq!(completion.finished, TimerMode::Pomodoro);
        assert_eq!(timer.settings.pomodoro_count, u64::MAX);
        assert_eq!(timer.mode, TimerMode::ShortBreak);
    }

    #[test]
    fn test_zero_interval_is_treated_as_one() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 1,
            long_break_interval: 0,
            ..Default::default()
        });

        run_to_completion(&mut timer);
        assert_eq!(timer.mode, TimerMode::LongBreak);
    }

    #[test]
    fn test_full_default_pomodoro() {
        let mut timer = PomodoroTimer::default();
        timer.start();

        let mut completions = 0;
        for _ in 0..1500 {
            // 整个过程中强制保持运行
            timer.running = true;
            if let TickOutcome::Completed(_) = timer.tick() {
                completions += 1;
            }
        }

        assert_eq!(completions, 1);
        assert_eq!(timer.settings.pomodoro_count, 1);
        assert_eq!(timer.mode, TimerMode::ShortBreak);
        assert_eq!(timer.remaining_seconds, timer.settings.short_break_time);
    }

    #[test]
    fn test_apply_settings_keeps_count() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_count: 5,
            ..Default::default()
        });
        timer.apply_settings(TimerSettings {
            pomodoro_time: 600,
            pomodoro_count: 0,
            ..Default::default()
        });
        assert_eq!(timer.settings.pomodoro_count, 5);
        assert_eq!(timer.remaining_seconds, 600);
    }

    #[test]
    fn test_progress() {
        let mut timer = PomodoroTimer::new(TimerSettings {
            pomodoro_time: 4,
            ..Default::default()
        });
        assert_eq!(timer.progress(), 0.0);
        timer.start();
        timer.tick();
        assert_eq!(timer.progress(), 25.0);
    }
}
