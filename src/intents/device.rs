//! LED and buzzer voice control

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::hardware::HardwareBus;
use crate::notify::Announcer;
use crate::{Error, Result};

use super::{IntentHandler, clean_text};

const LED_ON_KEYWORDS: &[&str] = &[
    "开灯", "打开灯", "开启灯", "打开电灯", "开启电灯", "把灯打开", "把灯开了",
    "灯开", "开个灯", "把灯开起来", "打开一下灯", "开一下灯", "灯亮", "亮灯",
];

const LED_OFF_KEYWORDS: &[&str] = &[
    "关灯", "关闭灯", "熄灯", "关掉灯", "把灯关了", "把灯关掉", "关闭电灯",
    "灯关", "关一下灯", "把灯关上", "关掉电灯", "熄掉灯", "灯灭",
];

const LED_BRIGHTER_KEYWORDS: &[&str] = &[
    "灯亮一点", "亮一点", "亮度高一点", "亮度大一点", "灯光亮一点", "提高亮度",
    "增加亮度", "灯太暗", "灯光太暗", "亮度太低", "灯不够亮", "太暗了", "不够亮",
];

const LED_DIMMER_KEYWORDS: &[&str] = &[
    "灯暗一点", "暗一点", "亮度低一点", "亮度小一点", "灯光暗一点", "降低亮度",
    "减小亮度", "灯太亮", "灯光太亮", "亮度太高", "太亮了", "太刺眼",
];

const LED_BLINK_KEYWORDS: &[&str] = &[
    "灯闪", "闪灯", "灯闪烁", "闪烁", "让灯闪烁", "灯光闪烁", "闪一下灯",
];

const BUZZER_ON_KEYWORDS: &[&str] = &["打开蜂鸣器", "开启蜂鸣器", "蜂鸣器响"];

const BUZZER_OFF_KEYWORDS: &[&str] = &["关闭蜂鸣器", "关掉蜂鸣器", "蜂鸣器停"];

/// Default brightness step for "brighter"/"dimmer"
const BRIGHTNESS_STEP: i8 = 20;

/// Default blink count
const DEFAULT_BLINK_TIMES: u8 = 3;

/// Drives LED and buzzer from spoken commands
pub struct DeviceIntent {
    bus: Arc<dyn HardwareBus>,
    announcer: Arc<Announcer>,
    percent_pattern: Regex,
    blink_pattern: Regex,
}

impl DeviceIntent {
    /// # Errors
    ///
    /// Returns error if a pattern fails to compile
    pub fn new(bus: Arc<dyn HardwareBus>, announcer: Arc<Announcer>) -> Result<Self> {
        Ok(Self {
            bus,
            announcer,
            percent_pattern: Regex::new(r"亮度.*?(\d+)")
                .map_err(|e| Error::Config(e.to_string()))?,
            blink_pattern: Regex::new(r"闪烁\s*(\d+)\s*次")
                .map_err(|e| Error::Config(e.to_string()))?,
        })
    }

    fn brightness_percent(&self, text: &str) -> Option<u8> {
        let captures = self.percent_pattern.captures(text)?;
        let value: u8 = captures.get(1)?.as_str().parse().ok()?;
        Some(value.clamp(1, 100))
    }

    async fn led_on(&self, text: &str) -> Result<String> {
        if let Some(percent) = self.brightness_percent(text) {
            self.bus.set_led_brightness(percent)?;
            Ok(format!("好的，已开灯，亮度设置为{percent}%"))
        } else {
            self.bus.set_led(true)?;
            Ok("好的，已开灯".to_string())
        }
    }

    async fn brighter(&self) -> Result<String> {
        let brightness = self.bus.adjust_led_brightness(BRIGHTNESS_STEP)?;
        Ok(format!("好的，已增加亮度，当前亮度{brightness}%"))
    }

    async fn dimmer(&self) -> Result<String> {
        if !self.bus.device_status().led_on {
            return Ok("灯已经关闭，无法降低亮度".to_string());
        }
        let brightness = self.bus.adjust_led_brightness(-BRIGHTNESS_STEP)?;
        Ok(format!("好的，已降低亮度，当前亮度{brightness}%"))
    }

    async fn blink(&self, text: &str) -> Result<String> {
        let times = self
            .blink_pattern
            .captures(text)
            .and_then(|c| c.get(1)?.as_str().parse::<u8>().ok())
            .map_or(DEFAULT_BLINK_TIMES, |t| t.clamp(1, 10));
        self.bus.blink_led(times)?;
        Ok(format!("好的，灯已闪烁{times}次"))
    }
}

#[async_trait]
impl IntentHandler for DeviceIntent {
    fn name(&self) -> &'static str {
        "device_control"
    }

    async fn detect(&self, text: &str) -> Result<bool> {
        let cleaned = clean_text(text).to_lowercase();
        let contains = |keywords: &[&str]| keywords.iter().any(|k| cleaned.contains(k));

        let response = if contains(BUZZER_ON_KEYWORDS) {
            self.bus.set_buzzer(true)?;
            "好的，蜂鸣器已开启".to_string()
        } else if contains(BUZZER_OFF_KEYWORDS) {
            self.bus.set_buzzer(false)?;
            "好的，蜂鸣器已关闭".to_string()
        } else if contains(LED_ON_KEYWORDS) {
            self.led_on(&cleaned).await?
        } else if contains(LED_OFF_KEYWORDS) {
            self.bus.set_led(false)?;
            "好的，已关灯".to_string()
        } else if contains(LED_BRIGHTER_KEYWORDS) {
            self.brighter().await?
        } else if contains(LED_DIMMER_KEYWORDS) {
            self.dimmer().await?
        } else if contains(LED_BLINK_KEYWORDS) {
            self.blink(&cleaned).await?
        } else {
            return Ok(false);
        };

        tracing::info!(response = %response, "device command handled");
        self.announcer.announce(&response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_percent_is_extracted_and_clamped() {
        let pattern = Regex::new(r"亮度.*?(\d+)").unwrap();
        let captures = pattern.captures("开灯亮度50").unwrap();
        assert_eq!(&captures[1], "50");

        let captures = pattern.captures("亮度设置为200").unwrap();
        let value: u8 = captures[1].parse().unwrap();
        assert_eq!(value.clamp(1, 100), 100);
    }

    #[test]
    fn blink_count_is_extracted() {
        let pattern = Regex::new(r"闪烁\s*(\d+)\s*次").unwrap();
        assert_eq!(&pattern.captures("让灯闪烁5次").unwrap()[1], "5");
        assert!(pattern.captures("让灯闪烁").is_none());
    }

    #[test]
    fn on_and_off_keywords_do_not_overlap() {
        for on in LED_ON_KEYWORDS {
            assert!(!LED_OFF_KEYWORDS.contains(on));
        }
    }
}
