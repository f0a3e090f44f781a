//! Time, date, and weather questions with the travel-advice follow-up

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;

use crate::notify::Announcer;
use crate::store::{ConfigStore, keys};
use crate::Result;

use super::weather::{WeatherClient, WeatherNow};
use super::{IntentHandler, clean_text};

const TIME_KEYWORDS: &[&str] = &[
    "时间",
    "几点了",
    "现在几点了",
    "当前时间",
    "现在的时间",
    "现在时间",
    "现在几点",
    "几点钟了",
    "几点钟",
    "时间是",
    "报时",
    "现在是什么时间",
    "告诉我时间",
    "告诉我几点了",
];

const DATE_KEYWORDS: &[&str] = &[
    "日期",
    "今天是几号",
    "今天的日期",
    "今天几号",
    "今天日期",
    "几月几号",
    "今天是什么日期",
    "几号了",
    "日期是",
    "今天是",
    "日历",
    "告诉我日期",
    "告诉我今天日期",
    "今天几月几号",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "天气",
    "天气怎么样",
    "天气如何",
    "查询天气",
    "今天天气",
    "天气情况",
    "天气预报",
    "今日天气",
    "现在天气",
    "今天的天气",
    "外面天气",
    "今天气温",
    "天气好吗",
];

const CONFIRM_WORDS: &[&str] = &[
    "是", "需要", "好的", "可以", "好", "对", "是的", "嗯", "确认", "要",
];

/// Answers time/date/weather questions locally
///
/// A weather report ends by asking whether travel advice is wanted; the
/// next utterance is then treated as the answer, and a confirmation sends
/// a weather-grounded prompt to the chat backend through the `command`
/// store key.
pub struct TimeIntent {
    store: Arc<ConfigStore>,
    announcer: Arc<Announcer>,
    weather: WeatherClient,
    city_pattern: Regex,
    pending_advice: Mutex<Option<WeatherNow>>,
}

impl TimeIntent {
    /// # Errors
    ///
    /// Returns error if the city pattern fails to compile
    pub fn new(
        store: Arc<ConfigStore>,
        announcer: Arc<Announcer>,
        weather: WeatherClient,
    ) -> Result<Self> {
        Ok(Self {
            store,
            announcer,
            weather,
            city_pattern: Regex::new(r"(.+?)的天气")
                .map_err(|e| crate::Error::Config(e.to_string()))?,
            pending_advice: Mutex::new(None),
        })
    }

    /// City spoken in the utterance, or the configured default
    fn extract_city(&self, text: &str) -> String {
        if let Some(captures) = self.city_pattern.captures(text) {
            if let Some(city) = captures.get(1) {
                let city = city.as_str();
                let len = city.chars().count();
                if len > 1 && len < 10 {
                    tracing::info!(city, "city extracted from utterance");
                    return city.to_string();
                }
            }
        }
        self.weather.default_city.clone()
    }

    async fn handle_advice_answer(&self, text: &str, cached: WeatherNow) -> Result<()> {
        if CONFIRM_WORDS.iter().any(|w| text.contains(w)) {
            self.store.set(keys::COMMAND, cached.advice_prompt());
            tracing::info!("travel advice requested, prompt queued for the chat backend");
            self.announcer.announce("好的，正在为您生成出行建议").await
        } else {
            self.announcer
                .announce("好的，如果之后需要出行建议请随时告诉我")
                .await
        }
    }

    async fn handle_weather(&self, city: &str) -> Result<()> {
        match self.weather.now(city).await {
            Ok(now) => {
                let report = now.report();
                *self.pending_advice.lock().expect("advice lock") = Some(now);
                self.announcer
                    .announce_many(&[report, "您需要今日的出行建议吗？".to_string()])
                    .await
            }
            Err(e) => {
                tracing::warn!(city, error = %e, "weather fetch failed");
                self.announcer
                    .announce(&format!("抱歉，无法获取{city}的天气信息"))
                    .await
            }
        }
    }
}

#[async_trait]
impl IntentHandler for TimeIntent {
    fn name(&self) -> &'static str {
        "time_and_weather"
    }

    async fn detect(&self, text: &str) -> Result<bool> {
        let cleaned = clean_text(text);

        let pending = self.pending_advice.lock().expect("advice lock").take();
        if let Some(cached) = pending {
            self.handle_advice_answer(&cleaned, cached).await?;
            return Ok(true);
        }

        if TIME_KEYWORDS.iter().any(|k| cleaned.contains(k)) {
            tracing::info!("time question");
            let now = Local::now().format("%H:%M");
            self.announcer.announce(&format!("当前时间:{now}")).await?;
            return Ok(true);
        }

        if DATE_KEYWORDS.iter().any(|k| cleaned.contains(k)) {
            tracing::info!("date question");
            let today = Local::now().format("%m月%d号");
            self.announcer
                .announce(&format!("今天的日期:{today}"))
                .await?;
            return Ok(true);
        }

        if WEATHER_KEYWORDS.iter().any(|k| cleaned.contains(k)) {
            tracing::info!("weather question");
            let city = self.extract_city(&cleaned);
            self.handle_weather(&city).await?;
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_pattern_extracts_prefix() {
        let pattern = Regex::new(r"(.+?)的天气").unwrap();
        let captures = pattern.captures("上海的天气怎么样").unwrap();
        assert_eq!(&captures[1], "上海");
        assert!(pattern.captures("今天天气怎么样").is_none());
    }

    #[test]
    fn keyword_lists_do_not_swallow_ordinary_chat() {
        let ordinary = clean_text("给我讲个笑话吧");
        assert!(!TIME_KEYWORDS.iter().any(|k| ordinary.contains(k)));
        assert!(!DATE_KEYWORDS.iter().any(|k| ordinary.contains(k)));
        assert!(!WEATHER_KEYWORDS.iter().any(|k| ordinary.contains(k)));
    }
}
