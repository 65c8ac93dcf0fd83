use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod models;
mod notify;
mod pomodoro;
mod service;
mod sound;
mod store;
mod ui;

use models::Task;
use notify::NotificationManager;
use pomodoro::format_remaining;
use service::{TimerService, UserCommand};
use sound::SoundPlayer;
use store::Store;

const LOG_FILE: &str = "pomodoro.log";

#[derive(Parser)]
#[command(name = "pomodoro")]
#[command(about = "Pomodoro timer with a small task list", long_about = None)]
struct Cli {
    /// Data directory for settings.json and tasks.json (defaults to user data directory)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Do not show desktop notifications
    #[arg(long)]
    no_notify: bool,

    /// Do not play the completion sound
    #[arg(long)]
    mute: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the timer menu
    Show,

    /// Add a new task
    Add {
        /// Task name
        name: String,
    },

    /// List all tasks
    List,

    /// Toggle a task between done and not done
    Toggle {
        /// Task number as shown by `list`
        number: usize,
    },

    /// Delete a task
    Delete {
        /// Task number as shown by `list`
        number: usize,
    },

    /// Show timer settings and completed pomodoros
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 确定数据目录
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => store::default_data_dir().context("Failed to get project directories")?,
    };
    let store = Store::open(&data_dir)?;

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => run_menu(store, cli.debug, !cli.no_notify, !cli.mute)?,
        command => {
            init_logging(cli.debug, None);
            run_command(&store, command);
        }
    }

    Ok(())
}

/// 启动菜单: 界面占用主线程, 服务和倒计时驱动运行在 tokio 运行时上
fn run_menu(store: Store, debug: bool, notifications: bool, sound: bool) -> Result<()> {
    // 终端被界面占用, 日志写入数据目录
    let log_path = store.dir().join(LOG_FILE);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    init_logging(debug, Some(log_file));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let chime = SoundPlayer::new(store.bell_path(), sound);
    let notifier = NotificationManager::new(notifications);
    let (service, handle) = TimerService::new(store, Box::new(chime), Box::new(notifier));
    let service_task = runtime.spawn(service.run());

    let ui_result = ui::run_app(&handle);

    // 界面异常退出时也要让服务走完关闭流程
    handle.send(UserCommand::Quit);
    runtime
        .block_on(service_task)
        .context("Timer service panicked")?;

    ui_result
}

fn run_command(store: &Store, command: Commands) {
    let mut tasks = store.load_tasks();

    match command {
        Commands::Show => {}
        Commands::Add { name } => match Task::new(&name) {
            Some(task) => {
                println!("✅ Task #{} added: {}", tasks.len() + 1, task.name);
                tasks.push(task);
                store.save_tasks(&tasks);
            }
            None => println!("❌ Task name cannot be empty"),
        },
        Commands::List => {
            if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                for (i, task) in tasks.iter().enumerate() {
                    let status_icon = if task.completed { "✅" } else { "⭕" };
                    println!("[{}] {} {}", i + 1, status_icon, task.name);
                }
            }
        }
        Commands::Toggle { number } => {
            match number.checked_sub(1).and_then(|i| tasks.get_mut(i)) {
                Some(task) => {
                    task.toggle();
                    let state = if task.completed { "completed" } else { "not completed" };
                    println!("✅ Task #{} marked as {}", number, state);
                    store.save_tasks(&tasks);
                }
                None => println!("❌ Task #{} not found", number),
            }
        }
        Commands::Delete { number } => {
            if (1..=tasks.len()).contains(&number) {
                let task = tasks.remove(number - 1);
                println!("🗑  Task #{} deleted: {}", number, task.name);
                store.save_tasks(&tasks);
            } else {
                println!("❌ Task #{} not found", number);
            }
        }
        Commands::Status => {
            let settings = store.load_settings();
            println!("Pomodoro:            {}", format_remaining(settings.pomodoro_time));
            println!("Short break:         {}", format_remaining(settings.short_break_time));
            println!("Long break:          {}", format_remaining(settings.long_break_time));
            println!("Long break interval: {}", settings.long_break_interval);
            println!("Completed pomodoros: {}", settings.pomodoro_count);
            println!("Data directory:      {}", store.dir().display());
        }
    }
}

/// 设置日志, RUST_LOG 优先
fn init_logging(debug: bool, log_file: Option<File>) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        None => builder.with_writer(io::stderr).init(),
    }
}
