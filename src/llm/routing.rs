//! Per-request choice between the plain and the web-search-capable model.

use crate::config::RoutingSettings;

/// Built-in keywords that suggest a question needs current information.
///
/// Matched as case-insensitive substrings, in order.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    // recency and news
    "最新",
    "ニュース",
    "今日",
    "昨日",
    "今週",
    "今年",
    "最近",
    "現在",
    "latest",
    "news",
    "today",
    "yesterday",
    "this week",
    "recent",
    "current",
    // explicit search requests
    "検索",
    "調べて",
    "ググって",
    "search",
    "look up",
    // finance and weather
    "株価",
    "為替",
    "相場",
    "天気",
    "天候",
    "stock",
    "exchange rate",
    "price of",
    "weather",
    "forecast",
    // events
    "イベント",
    "開催",
    "event",
    "schedule",
    // career and job market
    "転職",
    "求人",
    "年収",
    "就活",
    "job",
    "career",
    "salary",
    "hiring",
    // industries and markets
    "業界",
    "市場",
    "トレンド",
    "industry",
    "market",
    "trend",
    // age and generation
    "世代",
    "年代",
    "平均",
    "generation",
    "average",
    // relationships
    "恋愛",
    "結婚",
    "婚活",
    "dating",
    "marriage",
];

/// Decides whether a request runs in augmented (web search) mode.
#[derive(Debug, Clone)]
pub struct ToolRoutingPolicy {
    enabled: bool,
    /// Lowercased once at construction.
    keywords: Vec<String>,
}

impl Default for ToolRoutingPolicy {
    fn default() -> Self {
        Self::new(true, DEFAULT_KEYWORDS.iter().map(|keyword| keyword.to_string()))
    }
}

impl ToolRoutingPolicy {
    pub fn new(enabled: bool, keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            enabled,
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }

    pub fn from_settings(settings: &RoutingSettings) -> Self {
        match &settings.keywords {
            Some(keywords) => Self::new(settings.web_search_enabled, keywords.iter().cloned()),
            None => Self::new(
                settings.web_search_enabled,
                DEFAULT_KEYWORDS.iter().map(|keyword| keyword.to_string()),
            ),
        }
    }

    /// First match wins: an explicit override, then the global switch, then
    /// images (vision requests stay on the plain model), then keywords.
    pub fn should_use_augmented_mode(
        &self,
        text: &str,
        explicit_override: Option<bool>,
        has_images: bool,
    ) -> bool {
        if let Some(forced) = explicit_override {
            return forced;
        }
        if !self.enabled || has_images {
            return false;
        }

        let text = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| text.contains(keyword.as_str()))
            .inspect(|keyword| tracing::debug!(%keyword, "augmented mode selected by keyword"))
            .is_some()
    }
}
