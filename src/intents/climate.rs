//! Indoor temperature and humidity questions

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::hardware::HardwareBus;
use crate::notify::Announcer;
use crate::Result;

use super::{IntentHandler, clean_text};

const CLIMATE_KEYWORDS: &[&str] = &[
    "室内温度",
    "现在的温度",
    "温度是多少",
    "温度多少",
    "室内湿度",
    "现在的湿度",
    "湿度是多少",
    "湿度多少",
    "温湿度",
    "屋里多少度",
    "房间温度",
    "房间湿度",
];

/// A reading older than this is treated as unavailable
const MAX_READING_AGE_MINUTES: i64 = 5;

/// Answers indoor climate questions from the last sensor reading
pub struct ClimateIntent {
    bus: Arc<dyn HardwareBus>,
    announcer: Arc<Announcer>,
}

impl ClimateIntent {
    #[must_use]
    pub fn new(bus: Arc<dyn HardwareBus>, announcer: Arc<Announcer>) -> Self {
        Self { bus, announcer }
    }
}

#[async_trait]
impl IntentHandler for ClimateIntent {
    fn name(&self) -> &'static str {
        "indoor_climate"
    }

    async fn detect(&self, text: &str) -> Result<bool> {
        let cleaned = clean_text(text);
        if !CLIMATE_KEYWORDS.iter().any(|k| cleaned.contains(k)) {
            return Ok(false);
        }

        let fresh = self.bus.sensor_snapshot().filter(|snapshot| {
            Utc::now() - snapshot.updated_at < Duration::minutes(MAX_READING_AGE_MINUTES)
        });

        let response = match fresh {
            Some(snapshot) => format!(
                "当前室内温度{:.1}度，湿度{:.1}%",
                snapshot.temperature, snapshot.humidity
            ),
            None => {
                tracing::warn!("climate question but no fresh sensor reading");
                "抱歉，暂时没有可用的传感器数据".to_string()
            }
        };
        self.announcer.announce(&response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_cover_temperature_and_humidity_questions() {
        let matches = |text: &str| CLIMATE_KEYWORDS.iter().any(|k| clean_text(text).contains(k));
        assert!(matches("现在室内温度是多少？"));
        assert!(matches("湿度多少"));
        assert!(!matches("今天天气怎么样"));
        assert!(!matches("外面的温度")); // outdoor goes to the weather handler
    }
}
