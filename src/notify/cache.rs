//! Pre-synthesized phrase audio
//!
//! Fixed phrases (hourly chimes, startup greeting, error prompts) are
//! synthesized once into the sound directory so playback never waits on
//! the cloud.

use std::path::PathBuf;
use std::sync::Arc;

use crate::voice::{Cue, Synthesizer};
use crate::Result;

/// Phrase audio cache rooted at the sound directory
pub struct VoiceCache {
    sound_dir: PathBuf,
    synthesizer: Arc<dyn Synthesizer>,
}

impl VoiceCache {
    #[must_use]
    pub fn new(sound_dir: PathBuf, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            sound_dir,
            synthesizer,
        }
    }

    /// Path of a cached file, synthesizing it first if absent
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or the write fails
    pub async fn ensure(&self, file_name: &str, text: &str) -> Result<PathBuf> {
        let path = self.sound_dir.join(file_name);
        if path.exists() {
            return Ok(path);
        }

        tracing::info!(file = file_name, "synthesizing cached phrase");
        let audio = self.synthesizer.synthesize(text).await?;
        std::fs::create_dir_all(&self.sound_dir)?;
        std::fs::write(&path, audio)?;
        Ok(path)
    }

    /// Generate every fixed phrase that is missing, returning how many
    /// files were synthesized
    ///
    /// # Errors
    ///
    /// Returns error on the first failed synthesis
    pub async fn warm(&self) -> Result<usize> {
        let mut generated = 0;
        for (file_name, text) in fixed_phrases() {
            let path = self.sound_dir.join(&file_name);
            if path.exists() {
                continue;
            }
            self.ensure(&file_name, &text).await?;
            generated += 1;
        }
        tracing::info!(generated, "voice cache warmed");
        Ok(generated)
    }
}

/// File name of the cached fire alarm
pub const ALARM_FILE: &str = "fire_alarm.wav";

/// Spoken text of the fire alarm
pub const ALARM_PHRASE: &str = "警告！检测到火灾风险！请立即检查！";

/// Spoken text of the chime for a given hour (12-hour phrasing)
#[must_use]
pub fn hour_phrase(hour: u32) -> String {
    let display = if hour < 13 { hour } else { hour - 12 };
    format!("整点报时,已经{display}点啦")
}

/// File name of the cached chime for a given hour
#[must_use]
pub fn hour_file(hour: u32) -> String {
    format!("hour_{hour}.wav")
}

/// All phrases the cache can pre-generate
///
/// Tone cues (ding/dong) are shipped as assets, not synthesized.
fn fixed_phrases() -> Vec<(String, String)> {
    let mut phrases = vec![
        (
            Cue::Welcome.file_name().to_string(),
            "欢迎使用智能家居助手".to_string(),
        ),
        (
            Cue::Exit.file_name().to_string(),
            "再见，期待下次为您服务".to_string(),
        ),
        (
            Cue::Quit.file_name().to_string(),
            "录音失败，请稍后重试".to_string(),
        ),
        (
            Cue::RecoError.file_name().to_string(),
            "抱歉，我没有听清".to_string(),
        ),
        (
            Cue::ChatError.file_name().to_string(),
            "抱歉，对话服务出现问题".to_string(),
        ),
        (
            Cue::TtsError.file_name().to_string(),
            "抱歉，语音合成出现问题".to_string(),
        ),
        (
            Cue::HotwordStarted.file_name().to_string(),
            "语音唤醒已开启".to_string(),
        ),
        (ALARM_FILE.to_string(), ALARM_PHRASE.to_string()),
    ];
    for hour in 0..24 {
        phrases.push((hour_file(hour), hour_phrase(hour)));
    }
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_phrase_uses_twelve_hour_clock() {
        assert_eq!(hour_phrase(9), "整点报时,已经9点啦");
        assert_eq!(hour_phrase(12), "整点报时,已经12点啦");
        assert_eq!(hour_phrase(15), "整点报时,已经3点啦");
    }

    #[test]
    fn fixed_phrase_list_covers_every_hour() {
        let phrases = fixed_phrases();
        for hour in 0..24 {
            assert!(phrases.iter().any(|(f, _)| f == &hour_file(hour)));
        }
    }

    #[test]
    fn fixed_phrase_list_includes_the_fire_alarm() {
        assert!(fixed_phrases().iter().any(|(f, _)| f == ALARM_FILE));
    }
}
