//! Music playback commands
//!
//! Spoken commands are matched against a regex table. Catalog access goes
//! through a narrow client; when the music service is unreachable the
//! handler apologizes out loud and the turn still counts as handled.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::notify::Announcer;
use crate::store::{ConfigStore, keys};
use crate::voice::{ActiveSound, Playback};
use crate::{Error, Result};

use super::{IntentHandler, clean_text};

/// Volume step for "louder"/"quieter"
const VOLUME_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Play,
    Search,
    Next,
    Stop,
    VolumeSet,
    VolumeUp,
    VolumeDown,
}

/// One playable track from the catalog
#[derive(Debug, Clone)]
pub struct Track {
    pub mid: String,
    pub name: String,
    pub singer: String,
}

/// Narrow client for the local music catalog service
pub struct MusicClient {
    client: reqwest::Client,
    base_url: String,
}

impl MusicClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Free tracks from the station list
    async fn radio_list(&self) -> Result<Vec<Track>> {
        let url = format!("{}/radio?id=101", self.base_url);
        let body: RadioResponse = self.client.get(&url).send().await?.json().await?;
        let tracks = body
            .data
            .tracks
            .into_iter()
            .filter(|t| t.pay.pay_play == 0)
            .filter_map(|t| {
                Some(Track {
                    mid: t.mid,
                    name: t.name,
                    singer: t.singer.into_iter().next()?.name,
                })
            })
            .collect();
        Ok(tracks)
    }

    /// First free track matching the search words
    async fn search(&self, words: &str) -> Result<Option<Track>> {
        let url = format!(
            "{}/search?key={}",
            self.base_url,
            urlencoding::encode(words)
        );
        let body: SearchResponse = self.client.get(&url).send().await?.json().await?;
        let track = body
            .data
            .list
            .into_iter()
            .filter(|t| t.pay.pay_play == 0)
            .find_map(|t| {
                Some(Track {
                    mid: t.songmid,
                    name: t.songname,
                    singer: t.singer.into_iter().next()?.name,
                })
            });
        Ok(track)
    }

    /// Download the audio of a track
    async fn fetch_audio(&self, mid: &str) -> Result<Vec<u8>> {
        let url = format!("{}/song/url?id={mid}", self.base_url);
        let body: SongUrlResponse = self.client.get(&url).send().await?.json().await?;
        if body.result != 100 {
            return Err(Error::Music(format!(
                "song url request returned {}",
                body.result
            )));
        }
        let audio = self.client.get(&body.data).send().await?.bytes().await?;
        Ok(audio.to_vec())
    }
}

struct PlayState {
    queue: Vec<Track>,
    order: usize,
}

/// Handles spoken music commands
pub struct MusicIntent {
    store: Arc<ConfigStore>,
    announcer: Arc<Announcer>,
    playback: Arc<dyn Playback>,
    client: MusicClient,
    sound_dir: PathBuf,
    commands: Vec<(Action, Regex)>,
    state: Mutex<PlayState>,
    current: Mutex<Option<Arc<dyn ActiveSound>>>,
}

impl MusicIntent {
    /// # Errors
    ///
    /// Returns error if a command pattern fails to compile
    pub fn new(
        store: Arc<ConfigStore>,
        announcer: Arc<Announcer>,
        playback: Arc<dyn Playback>,
        client: MusicClient,
        sound_dir: PathBuf,
    ) -> Result<Self> {
        Ok(Self {
            store,
            announcer,
            playback,
            client,
            sound_dir,
            commands: command_table()?,
            state: Mutex::new(PlayState {
                queue: Vec::new(),
                order: 0,
            }),
            current: Mutex::new(None),
        })
    }

    fn match_command(&self, text: &str) -> Option<(Action, Option<String>)> {
        for (action, pattern) in &self.commands {
            if let Some(captures) = pattern.captures(text) {
                let param = captures.get(1).map(|m| m.as_str().to_string());
                return Some((*action, param));
            }
        }
        None
    }

    fn stop_current(&self) {
        let mut current = self.current.lock().expect("current sound lock");
        if let Some(sound) = current.take() {
            sound.stop();
        }
    }

    async fn play_track(&self, track: &Track) -> Result<()> {
        let audio = self.client.fetch_audio(&track.mid).await?;
        let path = self.sound_dir.join("music_current.mp3");
        std::fs::write(&path, audio)?;

        self.stop_current();
        self.announcer
            .announce(&format!("来自{}的,{}", track.singer, track.name))
            .await?;

        #[allow(clippy::cast_possible_truncation)]
        let volume = self
            .store
            .get_f64(keys::MUSIC_VOLUME)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0) as f32;
        let sound = self.playback.play_file_at(&path, volume)?;
        *self.current.lock().expect("current sound lock") = Some(sound);
        tracing::info!(song = %track.name, singer = %track.singer, "music playing");
        Ok(())
    }

    async fn play_from_queue(&self) -> Result<()> {
        let next = {
            let mut state = self.state.lock().expect("play state lock");
            if state.order >= state.queue.len() {
                None
            } else {
                let track = state.queue[state.order].clone();
                Some(track)
            }
        };

        let track = match next {
            Some(track) => track,
            None => {
                let queue = self.client.radio_list().await?;
                if queue.is_empty() {
                    return Err(Error::Music("station list is empty".to_string()));
                }
                let track = queue[0].clone();
                let mut state = self.state.lock().expect("play state lock");
                state.queue = queue;
                state.order = 0;
                track
            }
        };
        self.play_track(&track).await
    }

    async fn handle(&self, action: Action, param: Option<String>) -> Result<()> {
        match action {
            Action::Play => {
                if let Err(e) = self.play_from_queue().await {
                    tracing::warn!(error = %e, "music play failed");
                    self.announcer.announce("音乐服务暂时不可用").await?;
                }
            }
            Action::Search => {
                let words = normalize_search(param.as_deref().unwrap_or_default());
                if words.is_empty() {
                    return Ok(());
                }
                tracing::info!(words = %words, "music search");
                match self.client.search(&words).await {
                    Ok(Some(track)) => {
                        if let Err(e) = self.play_track(&track).await {
                            tracing::warn!(error = %e, "music playback failed");
                            self.announcer.announce("音乐服务暂时不可用").await?;
                        }
                    }
                    Ok(None) => {
                        self.announcer.announce("没有找到这首歌").await?;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "music search failed");
                        self.announcer.announce("音乐服务暂时不可用").await?;
                    }
                }
            }
            Action::Next => {
                {
                    let mut state = self.state.lock().expect("play state lock");
                    state.order += 1;
                }
                if let Err(e) = self.play_from_queue().await {
                    tracing::warn!(error = %e, "music next failed");
                    self.announcer.announce("音乐服务暂时不可用").await?;
                }
            }
            Action::Stop => {
                tracing::info!("music stopped by voice command");
                self.stop_current();
            }
            Action::VolumeSet => {
                if let Some(value) = param.and_then(|p| p.parse::<f64>().ok()) {
                    let volume = (value / 100.0).clamp(0.0, 1.0);
                    self.store.set(keys::MUSIC_VOLUME, volume);
                    tracing::info!(volume, "music volume set");
                }
            }
            Action::VolumeUp => {
                let volume = (self.store.get_f64(keys::MUSIC_VOLUME).unwrap_or(0.5)
                    + VOLUME_STEP)
                    .min(1.0);
                self.store.set(keys::MUSIC_VOLUME, volume);
                tracing::info!(volume, "music volume up");
            }
            Action::VolumeDown => {
                let volume = (self.store.get_f64(keys::MUSIC_VOLUME).unwrap_or(0.5)
                    - VOLUME_STEP)
                    .max(0.0);
                self.store.set(keys::MUSIC_VOLUME, volume);
                tracing::info!(volume, "music volume down");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IntentHandler for MusicIntent {
    fn name(&self) -> &'static str {
        "music"
    }

    async fn detect(&self, text: &str) -> Result<bool> {
        let cleaned = clean_text(text);
        let Some((action, param)) = self.match_command(&cleaned) else {
            return Ok(false);
        };
        self.handle(action, param).await?;
        Ok(true)
    }
}

/// Clean a captured search phrase ("歌手的歌曲" style input)
fn normalize_search(text: &str) -> String {
    let text = text.trim_end_matches('。').trim_start_matches('，');
    if text.contains("歌手") {
        if let Some((a, b)) = text.split_once('的') {
            return format!("{a} {b}").trim().to_string();
        }
    }
    text.trim().to_string()
}

fn command_table() -> Result<Vec<(Action, Regex)>> {
    let table = [
        (Action::Play, r"^播放音乐$"),
        (Action::Play, r"^播放歌曲$"),
        (Action::Play, r"^放(?:一首)?音乐$"),
        (Action::Play, r"^来(?:一首)?音乐$"),
        (Action::Play, r"^来(?:一首)?歌$"),
        (Action::Play, r"^放(?:一首)?歌$"),
        (Action::Play, r"继续播放"),
        (Action::Search, r"^播放音乐(.+)$"),
        (Action::Search, r"^搜索音乐(.+)$"),
        (Action::Search, r"^搜索歌曲(.+)$"),
        (Action::Search, r"^播放歌曲(.+)$"),
        (Action::Search, r"^播放(.+)的歌$"),
        (Action::Search, r"^来一首(.+)的歌$"),
        (Action::Search, r"^搜索(.+)的歌$"),
        (Action::Search, r"^放一首(.+)的歌$"),
        (Action::Next, r"^下一首$"),
        (Action::Next, r"^下一首音乐$"),
        (Action::Next, r"播放.*下一?首"),
        (Action::Next, r"切换.*下一?首"),
        (Action::Stop, r"停止.*音乐"),
        (Action::Stop, r"暂停.*音乐"),
        (Action::Stop, r"关闭.*音乐"),
        (Action::Stop, r"停止.*播放"),
        (Action::Stop, r"暂停.*播放"),
        (Action::Stop, r"关闭.*播放"),
        (Action::Stop, r"^静音$"),
        (Action::Stop, r"音乐关了"),
        (Action::VolumeSet, r"调整.*音量.*?(\d+)"),
        (Action::VolumeSet, r"调整.*声音.*?(\d+)"),
        (Action::VolumeUp, r"(?:声音|音量).*(?:大一点|调大|增加|提高)"),
        (Action::VolumeDown, r"(?:声音|音量).*(?:小一点|调小|减小|降低)"),
    ];

    table
        .into_iter()
        .map(|(action, pattern)| {
            Regex::new(pattern)
                .map(|re| (action, re))
                .map_err(|e| Error::Config(e.to_string()))
        })
        .collect()
}

#[derive(Deserialize)]
struct RadioResponse {
    data: RadioData,
}

#[derive(Deserialize)]
struct RadioData {
    #[serde(default)]
    tracks: Vec<RadioTrack>,
}

#[derive(Deserialize)]
struct RadioTrack {
    mid: String,
    name: String,
    #[serde(default)]
    singer: Vec<Singer>,
    pay: Pay,
}

#[derive(Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    list: Vec<SearchTrack>,
}

#[derive(Deserialize)]
struct SearchTrack {
    songmid: String,
    songname: String,
    #[serde(default)]
    singer: Vec<Singer>,
    pay: Pay,
}

#[derive(Deserialize)]
struct Singer {
    name: String,
}

#[derive(Deserialize)]
struct Pay {
    #[serde(alias = "payplay")]
    pay_play: u8,
}

#[derive(Deserialize)]
struct SongUrlResponse {
    result: u32,
    #[serde(default)]
    data: String,
}
