//! 计时服务
//!
//! `TimerService` 是计时器状态、任务列表和存储的唯一所有者。界面线程和倒计时
//! 驱动都只通过同一个命令通道提交修改, 服务按顺序逐条处理, 每次修改后在
//! `watch` 通道上发布一份 `Snapshot`, 由界面线程负责重绘。

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Duration};

use crate::models::{Task, TimerMode, TimerSettings};
use crate::notify::Notifier;
use crate::pomodoro::{format_remaining, Completion, PomodoroTimer, TickOutcome};
use crate::sound::Chime;
use crate::store::Store;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// 用户在菜单中触发的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    Pause,
    Reset,
    SetMode(TimerMode),
    AddTask(String),
    ToggleTask(usize),
    DeleteTask(usize),
    SaveSettings(TimerSettings),
    Quit,
}

#[derive(Debug)]
pub enum Command {
    User(UserCommand),
    /// 倒计时驱动每秒发送一次, generation 标识发送它的驱动
    Tick { generation: u64 },
}

/// 发布给界面线程的只读状态
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub mode: TimerMode,
    pub remaining_seconds: u64,
    pub running: bool,
    pub progress: f32,
    pub settings: TimerSettings,
    pub tasks: Vec<Task>,
}

impl Snapshot {
    /// 菜单标题, 例如 "25:00 - Pomodoro"
    pub fn title(&self) -> String {
        format!("{} - {}", format_remaining(self.remaining_seconds), self.mode.label())
    }
}

/// 界面侧持有的服务句柄
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ServiceHandle {
    /// 服务已退出时返回 false
    pub fn send(&self, command: UserCommand) -> bool {
        self.commands.send(Command::User(command)).is_ok()
    }

    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct TimerService {
    timer: PomodoroTimer,
    tasks: Vec<Task>,
    store: Store,
    chime: Box<dyn Chime>,
    notifier: Box<dyn Notifier>,
    commands: mpsc::UnboundedSender<Command>,
    inbox: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    driver: Option<oneshot::Sender<()>>,
    generation: u64,
}

impl TimerService {
    /// 从存储加载设置与任务, 计时器以番茄模式的完整时长开始
    pub fn new(
        store: Store,
        chime: Box<dyn Chime>,
        notifier: Box<dyn Notifier>,
    ) -> (Self, ServiceHandle) {
        let timer = PomodoroTimer::new(store.load_settings());
        let tasks = store.load_tasks();
        tracing::info!(
            "Loaded settings ({} pomodoros completed) and {} tasks from {:?}",
            timer.settings.pomodoro_count,
            tasks.len(),
            store.dir()
        );

        let (commands, inbox) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(snapshot_of(&timer, &tasks));

        let handle = ServiceHandle {
            commands: commands.clone(),
            snapshots: snapshot_rx,
        };
        let service = Self {
            timer,
            tasks,
            store,
            chime,
            notifier,
            commands,
            inbox,
            snapshots,
            driver: None,
            generation: 0,
        };
        (service, handle)
    }

    /// 处理命令直到收到 Quit, 然后执行关闭流程
    pub async fn run(mut self) {
        tracing::info!("Timer service started");

        while let Some(command) = self.inbox.recv().await {
            if self.handle(command) == Flow::Stop {
                break;
            }
        }

        self.shutdown();
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Tick { generation } => self.on_tick(generation),
            Command::User(command) => return self.on_user(command),
        }
        Flow::Continue
    }

    fn on_user(&mut self, command: UserCommand) -> Flow {
        tracing::debug!("User command: {:?}", command);

        match command {
            UserCommand::Start => {
                if self.timer.start() {
                    self.spawn_driver();
                    self.publish();
                }
            }
            UserCommand::Pause => {
                self.timer.pause();
                self.stop_driver();
                self.publish();
            }
            UserCommand::Reset => {
                self.timer.reset();
                self.stop_driver();
                self.publish();
            }
            UserCommand::SetMode(mode) => {
                self.timer.set_mode(mode);
                self.stop_driver();
                self.publish();
            }
            UserCommand::AddTask(name) => match Task::new(&name) {
                Some(task) => {
                    tracing::info!("Added task {:?}", task.name);
                    self.tasks.push(task);
                    self.store.save_tasks(&self.tasks);
                    self.publish();
                }
                None => tracing::debug!("Ignoring empty task name"),
            },
            UserCommand::ToggleTask(index) => match self.tasks.get_mut(index) {
                Some(task) => {
                    task.toggle();
                    self.store.save_tasks(&self.tasks);
                    self.publish();
                }
                None => tracing::debug!("Ignoring toggle of stale task index {}", index),
            },
            UserCommand::DeleteTask(index) => {
                if index < self.tasks.len() {
                    let task = self.tasks.remove(index);
                    tracing::info!("Deleted task {:?}", task.name);
                    self.store.save_tasks(&self.tasks);
                    self.publish();
                } else {
                    tracing::debug!("Ignoring delete of stale task index {}", index);
                }
            }
            UserCommand::SaveSettings(settings) => {
                if !settings.is_valid() {
                    tracing::warn!("Rejecting invalid settings {:?}", settings);
                    return Flow::Continue;
                }
                self.timer.apply_settings(settings);
                self.stop_driver();
                self.store.save_settings(&self.timer.settings);
                self.publish();
            }
            UserCommand::Quit => return Flow::Stop,
        }

        Flow::Continue
    }

    fn on_tick(&mut self, generation: u64) {
        // 已取消的驱动留在队列中的 tick
        if generation != self.generation {
            return;
        }

        match self.timer.tick() {
            TickOutcome::Idle => {}
            TickOutcome::Counting(_) => self.publish(),
            TickOutcome::Completed(completion) => {
                self.stop_driver();
                self.complete(completion);
                self.publish();
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        tracing::info!(
            "{} finished, switching to {} (completed pomodoros: {})",
            completion.finished.label(),
            completion.next.label(),
            self.timer.settings.pomodoro_count
        );

        self.chime.play_completion_sound();
        self.notifier
            .show_notification(completion.title, completion.body);
        self.store.save_settings(&self.timer.settings);
    }

    fn spawn_driver(&mut self) {
        self.stop_driver();
        self.generation += 1;

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(countdown(self.commands.clone(), self.generation, stop_rx));
        self.driver = Some(stop_tx);
    }

    fn stop_driver(&mut self) {
        if let Some(stop) = self.driver.take() {
            let _ = stop.send(());
        }
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(snapshot_of(&self.timer, &self.tasks));
    }

    /// 停止驱动并写回两个文档
    fn shutdown(&mut self) {
        self.stop_driver();
        self.store.save_settings(&self.timer.settings);
        self.store.save_tasks(&self.tasks);
        tracing::info!("Timer service stopped");
    }
}

fn snapshot_of(timer: &PomodoroTimer, tasks: &[Task]) -> Snapshot {
    Snapshot {
        mode: timer.mode,
        remaining_seconds: timer.remaining_seconds,
        running: timer.running,
        progress: timer.progress(),
        settings: timer.settings,
        tasks: tasks.to_vec(),
    }
}

/// 倒计时驱动: 每次等待一秒后发送 tick, 收到停止信号或服务退出时结束
async fn countdown(
    commands: mpsc::UnboundedSender<Command>,
    generation: u64,
    mut stop: oneshot::Receiver<()>,
) {
    tracing::debug!("Countdown driver {} started", generation);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = sleep(TICK_INTERVAL) => {
                if commands.send(Command::Tick { generation }).is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Countdown driver {} exited", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Chime for Recorder {
        fn play_completion_sound(&self) {
            self.events.lock().unwrap().push("chime".to_string());
        }
    }

    impl Notifier for Recorder {
        fn show_notification(&self, title: &str, body: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}: {}", title, body));
        }
    }

    fn service_with(settings: TimerSettings) -> (TimerService, ServiceHandle, Recorder, TempDir) {
        let temp_dir = tempdir().unwrap();
        let store = Store::open(temp_dir.path()).unwrap();
        store.save_settings(&settings);

        let recorder = Recorder::default();
        let (service, handle) = TimerService::new(
            store,
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
        );
        (service, handle, recorder, temp_dir)
    }

    fn user(service: &mut TimerService, command: UserCommand) -> Flow {
        service.handle(Command::User(command))
    }

    fn tick(service: &mut TimerService) {
        let generation = service.generation;
        service.handle(Command::Tick { generation });
    }

    #[tokio::test]
    async fn test_initial_snapshot_reflects_settings() {
        let (_service, handle, _recorder, _dir) = service_with(TimerSettings {
            pomodoro_time: 600,
            ..Default::default()
        });

        let snapshot = handle.snapshots().borrow().clone();
        assert_eq!(snapshot.mode, TimerMode::Pomodoro);
        assert_eq!(snapshot.remaining_seconds, 600);
        assert!(!snapshot.running);
        assert_eq!(snapshot.title(), "10:00 - Pomodoro");
    }

    #[tokio::test]
    async fn test_start_spawns_one_driver() {
        let (mut service, handle, _recorder, _dir) = service_with(TimerSettings::default());

        user(&mut service, UserCommand::Start);
        assert_eq!(service.generation, 1);
        assert!(service.driver.is_some());

        user(&mut service, UserCommand::Start);
        assert_eq!(service.generation, 1);
        assert!(handle.snapshots().borrow().running);
    }

    #[tokio::test]
    async fn test_stale_ticks_are_ignored() {
        let (mut service, _handle, _recorder, _dir) = service_with(TimerSettings::default());

        user(&mut service, UserCommand::Start);
        let old_generation = service.generation;
        user(&mut service, UserCommand::Pause);
        user(&mut service, UserCommand::Start);

        service.handle(Command::Tick {
            generation: old_generation,
        });
        assert_eq!(service.timer.remaining_seconds, 1500);

        tick(&mut service);
        assert_eq!(service.timer.remaining_seconds, 1499);
    }

    #[tokio::test]
    async fn test_pause_keeps_remaining_time() {
        let (mut service, handle, _recorder, _dir) = service_with(TimerSettings::default());

        user(&mut service, UserCommand::Start);
        tick(&mut service);
        user(&mut service, UserCommand::Pause);
        user(&mut service, UserCommand::Pause);

        let snapshot = handle.snapshots().borrow().clone();
        assert!(!snapshot.running);
        assert_eq!(snapshot.remaining_seconds, 1499);
        assert!(service.driver.is_none());
    }

    #[tokio::test]
    async fn test_full_pomodoro_runs_completion_once() {
        let (mut service, handle, recorder, dir) = service_with(TimerSettings::default());

        user(&mut service, UserCommand::Start);
        for _ in 0..1500 {
            tick(&mut service);
        }

        let snapshot = handle.snapshots().borrow().clone();
        assert_eq!(snapshot.mode, TimerMode::ShortBreak);
        assert_eq!(snapshot.remaining_seconds, 300);
        assert!(!snapshot.running);
        assert_eq!(snapshot.settings.pomodoro_count, 1);
        assert_eq!(
            recorder.events(),
            vec!["chime", "Pomodoro Completed: Time to take a break!"]
        );

        let stored = Store::open(dir.path()).unwrap().load_settings();
        assert_eq!(stored.pomodoro_count, 1);
    }

    #[tokio::test]
    async fn test_break_completion_notifies_focus() {
        let (mut service, handle, recorder, _dir) = service_with(TimerSettings {
            long_break_time: 2,
            ..Default::default()
        });

        user(&mut service, UserCommand::SetMode(TimerMode::LongBreak));
        user(&mut service, UserCommand::Start);
        tick(&mut service);
        tick(&mut service);

        assert_eq!(handle.snapshots().borrow().mode, TimerMode::Pomodoro);
        assert_eq!(
            recorder.events(),
            vec!["chime", "Break Completed: Time to focus!"]
        );
    }

    #[tokio::test]
    async fn test_task_commands() {
        let (mut service, handle, _recorder, dir) = service_with(TimerSettings::default());

        user(&mut service, UserCommand::AddTask("  first ".to_string()));
        user(&mut service, UserCommand::AddTask("   ".to_string()));
        user(&mut service, UserCommand::AddTask("second".to_string()));
        user(&mut service, UserCommand::ToggleTask(1));

        let tasks = handle.snapshots().borrow().tasks.clone();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "first");
        assert!(tasks[1].completed);

        user(&mut service, UserCommand::DeleteTask(0));
        let stored = Store::open(dir.path()).unwrap().load_tasks();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "second");
    }

    #[tokio::test]
    async fn test_stale_task_indices_are_ignored() {
        let (mut service, handle, _recorder, _dir) = service_with(TimerSettings::default());
        user(&mut service, UserCommand::AddTask("only".to_string()));

        user(&mut service, UserCommand::ToggleTask(3));
        user(&mut service, UserCommand::DeleteTask(1));

        let tasks = handle.snapshots().borrow().tasks.clone();
        assert_eq!(tasks.len(), 1);
        assert!(!tasks[0].completed);
    }

    #[tokio::test]
    async fn test_save_settings_keeps_count_and_resets() {
        let (mut service, handle, _recorder, dir) = service_with(TimerSettings {
            pomodoro_count: 6,
            ..Default::default()
        });
        user(&mut service, UserCommand::Start);
        tick(&mut service);

        user(
            &mut service,
            UserCommand::SaveSettings(TimerSettings {
                pomodoro_time: 45 * 60,
                short_break_time: 10 * 60,
                long_break_time: 20 * 60,
                long_break_interval: 3,
                pomodoro_count: 0,
            }),
        );

        let snapshot = handle.snapshots().borrow().clone();
        assert!(!snapshot.running);
        assert_eq!(snapshot.remaining_seconds, 45 * 60);
        assert_eq!(snapshot.settings.pomodoro_count, 6);

        let stored = Store::open(dir.path()).unwrap().load_settings();
        assert_eq!(stored.long_break_interval, 3);
        assert_eq!(stored.pomodoro_count, 6);
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (mut service, _handle, _recorder, _dir) = service_with(TimerSettings::default());

        user(
            &mut service,
            UserCommand::SaveSettings(TimerSettings {
                pomodoro_time: 0,
                ..Default::default()
            }),
        );
        assert_eq!(service.timer.settings.pomodoro_time, 1500);
    }

    #[tokio::test]
    async fn test_quit_stops_service() {
        let (mut service, _handle, _recorder, _dir) = service_with(TimerSettings::default());
        assert_eq!(user(&mut service, UserCommand::Quit), Flow::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_counts_down_and_shutdown_flushes() {
        let (service, handle, recorder, dir) = service_with(TimerSettings {
            pomodoro_time: 3,
            pomodoro_count: 3,
            ..Default::default()
        });
        let join = tokio::spawn(service.run());

        let mut snapshots = handle.snapshots();
        assert!(handle.send(UserCommand::Start));
        handle.send(UserCommand::AddTask("review".to_string()));

        while snapshots.borrow_and_update().mode != TimerMode::LongBreak {
            snapshots.changed().await.unwrap();
        }
        assert_eq!(snapshots.borrow().settings.pomodoro_count, 4);

        handle.send(UserCommand::Quit);
        join.await.unwrap();
        assert!(!handle.send(UserCommand::Start));

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.load_settings().pomodoro_count, 4);
        assert_eq!(store.load_tasks().len(), 1);
        assert_eq!(recorder.events().len(), 2);
    }
}
