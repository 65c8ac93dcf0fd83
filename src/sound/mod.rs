use std::path::PathBuf;

/// 完成提示音能力, 不得阻塞调用方
pub trait Chime: Send {
    fn play_completion_sound(&self);
}

/// 提示音播放器
///
/// 优先播放数据目录下的 `sounds/bell.*`, 解码失败时退回合成的双音提示,
/// 没有可用的音频输出时静默跳过。编译时未启用 `audio` feature 则只响终端铃。
pub struct SoundPlayer {
    bell: Option<PathBuf>,
    enabled: bool,
}

impl SoundPlayer {
    pub fn new(bell: Option<PathBuf>, enabled: bool) -> Self {
        Self { bell, enabled }
    }
}

impl Chime for SoundPlayer {
    fn play_completion_sound(&self) {
        if !self.enabled {
            return;
        }
        playback::spawn(self.bell.clone());
    }
}

#[cfg(feature = "audio")]
mod playback {
    use rodio::source::{SineWave, Source};
    use rodio::{Decoder, OutputStream, Sink};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;

    /// 独立线程播放, OutputStream 不能跨线程
    pub fn spawn(bell: Option<PathBuf>) {
        let spawned = thread::Builder::new()
            .name("chime".to_string())
            .spawn(move || {
                if let Err(e) = play(bell.as_deref()) {
                    tracing::warn!("Completion sound unavailable: {}", e);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn chime thread: {}", e);
        }
    }

    fn play(bell: Option<&Path>) -> Result<(), String> {
        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
        let sink =
            Sink::try_new(&handle).map_err(|e| format!("Failed to create audio sink: {}", e))?;

        match bell.map(open_bell) {
            Some(Ok(decoder)) => sink.append(decoder),
            Some(Err(e)) => {
                tracing::warn!("{}, falling back to synthetic tone", e);
                append_tone(&sink);
            }
            None => append_tone(&sink),
        }

        sink.sleep_until_end();
        Ok(())
    }

    fn open_bell(path: &Path) -> Result<Decoder<BufReader<File>>, String> {
        let file = File::open(path).map_err(|e| format!("Cannot open {:?}: {}", path, e))?;
        Decoder::new(BufReader::new(file)).map_err(|e| format!("Cannot decode {:?}: {}", path, e))
    }

    fn append_tone(sink: &Sink) {
        for freq in [880.0, 660.0] {
            sink.append(
                SineWave::new(freq)
                    .take_duration(Duration::from_millis(220))
                    .amplify(0.2),
            );
        }
    }
}

#[cfg(not(feature = "audio"))]
mod playback {
    use std::io::{self, Write};
    use std::path::PathBuf;

    /// 未编译音频支持, 用终端响铃代替
    pub fn spawn(bell: Option<PathBuf>) {
        tracing::debug!("Built without audio support, ringing terminal bell ({:?})", bell);
        if let Err(e) = ring(&mut io::stdout()) {
            tracing::warn!("Failed to ring terminal bell: {}", e);
        }
    }

    pub(super) fn ring<W: Write>(out: &mut W) -> io::Result<()> {
        out.write_all(b"\x07")?;
        out.flush()
    }
}
