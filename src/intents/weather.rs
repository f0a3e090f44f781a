//! QWeather current-conditions client

use serde::Deserialize;

use crate::config::WeatherConfig;
use crate::{Error, Result};

/// City ID used when lookup fails (Beijing)
const DEFAULT_CITY_ID: &str = "101010100";

/// Current conditions for one city
#[derive(Debug, Clone)]
pub struct WeatherNow {
    pub city: String,
    pub temperature: String,
    pub feels_like: String,
    pub condition: String,
    pub humidity: String,
    pub wind_dir: String,
    pub wind_scale: String,
    pub precip: String,
}

impl WeatherNow {
    /// Spoken weather report
    #[must_use]
    pub fn report(&self) -> String {
        let mut text = format!(
            "{}当前天气{}，温度{}度，体感温度{}度，湿度{}%，{}{}级",
            self.city,
            self.condition,
            self.temperature,
            self.feels_like,
            self.humidity,
            self.wind_dir,
            self.wind_scale
        );
        if self.precip.parse::<f64>().unwrap_or(0.0) > 0.0 {
            text.push_str(&format!("，降水量{}毫米", self.precip));
        }
        text
    }

    /// Prompt asking the chat backend for travel advice from this data
    #[must_use]
    pub fn advice_prompt(&self) -> String {
        let mut prompt = String::from("基于以下气象数据，以口语化的方式给出今日出门建议：\n");
        prompt.push_str(&format!("城市：{}\n", self.city));
        prompt.push_str(&format!("户外状况：{}\n", self.condition));
        prompt.push_str(&format!("气温：{}°C\n", self.temperature));
        prompt.push_str(&format!("体感温度：{}°C\n", self.feels_like));
        prompt.push_str(&format!("空气湿度：{}%\n", self.humidity));
        prompt.push_str(&format!("风向：{}\n", self.wind_dir));
        prompt.push_str(&format!("风力等级：{}级\n", self.wind_scale));
        if self.precip.parse::<f64>().unwrap_or(0.0) > 0.0 {
            prompt.push_str(&format!("降水量：{}毫米\n", self.precip));
        }
        prompt.push_str(
            "请给出穿着、交通方式、是否携带雨具等方面的建议。\
             作为语音助手回答，语气自然，不要分点，控制在100字以内。",
        );
        prompt
    }
}

/// QWeather API client
pub struct WeatherClient {
    client: reqwest::Client,
    key: String,
    lookup_url: String,
    now_url: String,
    pub default_city: String,
}

impl WeatherClient {
    #[must_use]
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: config.key.clone(),
            lookup_url: format!("https://{}/geo/v2/city/lookup", config.host),
            now_url: format!("https://{}/v7/weather/now", config.host),
            default_city: config.default_city.clone(),
        }
    }

    /// Override both endpoints with a common base URL (tests)
    #[must_use]
    pub fn with_endpoint(mut self, base: &str) -> Self {
        self.lookup_url = format!("{base}/geo/v2/city/lookup");
        self.now_url = format!("{base}/v7/weather/now");
        self
    }

    /// Resolve a city name to its location ID, defaulting to Beijing
    async fn city_id(&self, city: &str) -> String {
        let result: Result<CityLookup> = async {
            let response = self
                .client
                .get(&self.lookup_url)
                .query(&[("key", self.key.as_str()), ("location", city)])
                .send()
                .await?;
            Ok(response.json().await?)
        }
        .await;

        match result {
            Ok(lookup) if lookup.code == "200" => {
                if let Some(location) = lookup.location.first() {
                    tracing::info!(city, id = %location.id, "resolved city");
                    return location.id.clone();
                }
                tracing::warn!(city, "no city match, using default");
                DEFAULT_CITY_ID.to_string()
            }
            Ok(lookup) => {
                tracing::warn!(city, code = %lookup.code, "city lookup rejected, using default");
                DEFAULT_CITY_ID.to_string()
            }
            Err(e) => {
                tracing::warn!(city, error = %e, "city lookup failed, using default");
                DEFAULT_CITY_ID.to_string()
            }
        }
    }

    /// Fetch current conditions for a city
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects it
    pub async fn now(&self, city: &str) -> Result<WeatherNow> {
        let city_id = self.city_id(city).await;
        let response = self
            .client
            .get(&self.now_url)
            .query(&[("key", self.key.as_str()), ("location", city_id.as_str())])
            .send()
            .await?;
        let body: NowResponse = response.json().await?;

        if body.code != "200" {
            return Err(Error::Weather(format!(
                "weather API returned code {}",
                body.code
            )));
        }
        let now = body
            .now
            .ok_or_else(|| Error::Weather("weather API returned no conditions".to_string()))?;

        Ok(WeatherNow {
            city: city.to_string(),
            temperature: now.temp,
            feels_like: now.feels_like,
            condition: now.text,
            humidity: now.humidity,
            wind_dir: now.wind_dir,
            wind_scale: now.wind_scale,
            precip: now.precip,
        })
    }
}

#[derive(Deserialize)]
struct CityLookup {
    code: String,
    #[serde(default)]
    location: Vec<CityLocation>,
}

#[derive(Deserialize)]
struct CityLocation {
    id: String,
}

#[derive(Deserialize)]
struct NowResponse {
    code: String,
    now: Option<NowConditions>,
}

#[derive(Deserialize)]
struct NowConditions {
    temp: String,
    #[serde(rename = "feelsLike")]
    feels_like: String,
    text: String,
    humidity: String,
    #[serde(rename = "windDir")]
    wind_dir: String,
    #[serde(rename = "windScale")]
    wind_scale: String,
    #[serde(default)]
    precip: String,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(base: &str) -> WeatherClient {
        WeatherClient::new(&WeatherConfig {
            key: "test-key".to_string(),
            host: "example.invalid".to_string(),
            default_city: "北京".to_string(),
        })
        .with_endpoint(base)
    }

    fn sample() -> WeatherNow {
        WeatherNow {
            city: "上海".to_string(),
            temperature: "26".to_string(),
            feels_like: "28".to_string(),
            condition: "多云".to_string(),
            humidity: "70".to_string(),
            wind_dir: "东南风".to_string(),
            wind_scale: "3".to_string(),
            precip: "0.0".to_string(),
        }
    }

    #[test]
    fn report_omits_precip_when_dry() {
        let report = sample().report();
        assert!(report.contains("上海当前天气多云"));
        assert!(!report.contains("降水量"));

        let mut wet = sample();
        wet.precip = "1.2".to_string();
        assert!(wet.report().contains("降水量1.2毫米"));
    }

    #[tokio::test]
    async fn now_resolves_city_then_fetches_conditions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/v2/city/lookup"))
            .and(query_param("location", "上海"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200",
                "location": [{"id": "101020100"}],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v7/weather/now"))
            .and(query_param("location", "101020100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200",
                "now": {
                    "temp": "26", "feelsLike": "28", "text": "多云",
                    "humidity": "70", "windDir": "东南风", "windScale": "3",
                    "precip": "0.0",
                },
            })))
            .mount(&server)
            .await;

        let weather = test_client(&server.uri()).now("上海").await.unwrap();
        assert_eq!(weather.condition, "多云");
        assert_eq!(weather.temperature, "26");
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_default_city_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/v2/city/lookup"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v7/weather/now"))
            .and(query_param("location", DEFAULT_CITY_ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200",
                "now": {
                    "temp": "20", "feelsLike": "19", "text": "晴",
                    "humidity": "40", "windDir": "北风", "windScale": "2",
                    "precip": "0.0",
                },
            })))
            .mount(&server)
            .await;

        let weather = test_client(&server.uri()).now("不存在的城市").await.unwrap();
        assert_eq!(weather.condition, "晴");
    }

    #[tokio::test]
    async fn non_200_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/v2/city/lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "200",
                "location": [{"id": "101010100"}],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v7/weather/now"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "402",
            })))
            .mount(&server)
            .await;

        assert!(test_client(&server.uri()).now("北京").await.is_err());
    }
}
