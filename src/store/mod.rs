use directories::ProjectDirs;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::models::{Task, TimerSettings};

const SETTINGS_FILE: &str = "settings.json";
const TASKS_FILE: &str = "tasks.json";
const SOUNDS_DIR: &str = "sounds";
const BELL_CANDIDATES: [&str; 4] = ["bell.mp3", "bell.wav", "bell.ogg", "bell.flac"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 默认数据目录 (平台用户数据目录)
pub fn default_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "pomodoro-tray", "pomodoro").map(|dirs| dirs.data_dir().to_path_buf())
}

/// 设置与任务两个 JSON 文档的读写
///
/// 读取永不失败: 缺失或损坏的文档回退为默认值。写入失败只记录日志。
/// 两个文档相互独立, 一个写入失败不影响另一个。
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// 打开数据目录, 不存在则创建
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    /// 自定义完成提示音文件 (sounds/bell.*)
    pub fn bell_path(&self) -> Option<PathBuf> {
        let sounds = self.dir.join(SOUNDS_DIR);
        BELL_CANDIDATES
            .iter()
            .map(|name| sounds.join(name))
            .find(|path| path.is_file())
    }

    // ==================== Settings ====================

    /// 读取设置, 缺失或非法的字段使用默认值
    pub fn load_settings(&self) -> TimerSettings {
        let path = self.settings_path();
        match read_json(&path) {
            Ok(Some(Value::Object(fields))) => settings_from_fields(&fields),
            Ok(Some(_)) => {
                tracing::warn!("Settings document {:?} is not an object, using defaults", path);
                TimerSettings::default()
            }
            Ok(None) => TimerSettings::default(),
            Err(e) => {
                tracing::warn!("{}, using default settings", e);
                TimerSettings::default()
            }
        }
    }

    /// 保存设置
    pub fn save_settings(&self, settings: &TimerSettings) {
        let path = self.settings_path();
        match write_json(&path, settings) {
            Ok(()) => tracing::debug!("Saved settings to {:?}", path),
            Err(e) => tracing::warn!("Could not save settings: {}", e),
        }
    }

    // ==================== Tasks ====================

    /// 读取任务列表, 文档损坏时返回空列表 (不删除原文件), 无法解析的单条任务被跳过
    pub fn load_tasks(&self) -> Vec<Task> {
        let path = self.tasks_path();
        let value = match read_json(&path) {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("{}, starting with an empty task list", e);
                return Vec::new();
            }
        };

        let entries = match value {
            Value::Array(entries) => entries,
            _ => {
                tracing::warn!("Tasks document {:?} is not an array, starting empty", path);
                return Vec::new();
            }
        };

        // 逐条解析, 单条损坏只跳过该条
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value::<Task>(entry) {
                Ok(task) => task_from_entry(task).or_else(|| {
                    tracing::warn!("Skipping task #{} in {:?}: empty name", i + 1, path);
                    None
                }),
                Err(e) => {
                    tracing::warn!("Skipping task #{} in {:?}: {}", i + 1, path, e);
                    None
                }
            })
            .collect()
    }

    /// 保存任务列表
    pub fn save_tasks(&self, tasks: &[Task]) {
        let path = self.tasks_path();
        match write_json(&path, tasks) {
            Ok(()) => tracing::debug!("Saved {} tasks to {:?}", tasks.len(), path),
            Err(e) => tracing::warn!("Could not save tasks: {}", e),
        }
    }
}

fn settings_from_fields(fields: &Map<String, Value>) -> TimerSettings {
    let defaults = TimerSettings::default();

    let positive = |key: &str, default: u64| {
        match fields.get(key) {
            None => default,
            Some(value) => match value.as_u64().filter(|v| *v > 0) {
                Some(v) => v,
                None => {
                    tracing::warn!("Ignoring invalid setting {}={}", key, value);
                    default
                }
            },
        }
    };

    TimerSettings {
        pomodoro_time: positive("pomodoro_time", defaults.pomodoro_time),
        short_break_time: positive("short_break_time", defaults.short_break_time),
        long_break_time: positive("long_break_time", defaults.long_break_time),
        long_break_interval: positive("long_break_interval", defaults.long_break_interval),
        pomodoro_count: fields
            .get("pomodoro_count")
            .and_then(Value::as_u64)
            .unwrap_or(defaults.pomodoro_count),
    }
}

/// 名称去除首尾空白, 为空的任务丢弃
fn task_from_entry(mut task: Task) -> Option<Task> {
    let name = task.name.trim().to_string();
    if name.is_empty() {
        return None;
    }
    task.name = name;
    Some(task)
}

/// 读取 JSON 文档, 文件不存在时返回 None
fn read_json(path: &Path) -> Result<Option<Value>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// 先写同目录临时文件再重命名, 写到一半崩溃不会破坏原文件
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir).map_err(write_err)?;

    serde_json::to_writer_pretty(&mut temp_file, value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    temp_file.flush().map_err(write_err)?;

    temp_file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
