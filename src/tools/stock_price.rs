//! 股价查询工具（finance 类）
//!
//! 报价来源抽象为 QuoteSource：StaticQuotes 用于离线 / 测试，HttpQuoteSource 调用 Yahoo 风格的
//! chart 接口（`{base}/v8/finance/chart/{TICKER}`，读取 `chart.result[0].meta.regularMarketPrice`）。
//! 未知代码返回软错误（"not found"），由 Worker 作为观察交给 LLM。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::tools::Tool;

pub const DEFAULT_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub currency: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("{0}: possibly delisted; Quote not found for symbol")]
    NotFound(String),

    #[error("Quote request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<Quote, QuoteError>;
}

/// 固定报价表（代码大小写不敏感）
#[derive(Debug, Clone, Default)]
pub struct StaticQuotes {
    quotes: HashMap<String, (f64, String)>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, price: f64, currency: &str) -> Self {
        self.quotes
            .insert(ticker.to_uppercase(), (price, currency.to_string()));
        self
    }

    /// 从配置表（ticker -> price）构造，币种统一为 USD
    pub fn from_prices(prices: &HashMap<String, f64>) -> Self {
        prices
            .iter()
            .fold(Self::new(), |q, (ticker, price)| q.with(ticker, *price, "USD"))
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn quote(&self, ticker: &str) -> Result<Quote, QuoteError> {
        let key = ticker.to_uppercase();
        self.quotes
            .get(&key)
            .map(|(price, currency)| Quote {
                ticker: key.clone(),
                price: *price,
                currency: currency.clone(),
            })
            .ok_or(QuoteError::NotFound(key))
    }
}

/// 在线报价：GET chart 接口并解析 meta
pub struct HttpQuoteSource {
    client: Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("hive/0.1")
            .build()
            .map_err(|e| QuoteError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_QUOTE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// 解析 chart 响应；result 为空或缺少价格视为未找到
fn parse_chart(ticker: &str, body: &Value) -> Result<Quote, QuoteError> {
    let meta = body
        .pointer("/chart/result/0/meta")
        .ok_or_else(|| QuoteError::NotFound(ticker.to_string()))?;
    let price = meta
        .get("regularMarketPrice")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| QuoteError::NotFound(ticker.to_string()))?;
    let currency = meta
        .get("currency")
        .and_then(|v| v.as_str())
        .unwrap_or("USD")
        .to_string();
    Ok(Quote {
        ticker: ticker.to_string(),
        price,
        currency,
    })
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn quote(&self, ticker: &str) -> Result<Quote, QuoteError> {
        let ticker = ticker.to_uppercase();
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteError::Request(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(QuoteError::NotFound(ticker));
        }
        if !resp.status().is_success() {
            return Err(QuoteError::Request(format!("HTTP {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| QuoteError::Request(e.to_string()))?;
        parse_chart(&ticker, &body)
    }
}

pub struct StockPriceTool {
    source: Arc<dyn QuoteSource>,
}

impl StockPriceTool {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Get the current price of a stock using its Ticker Symbol."
    }

    fn categories(&self) -> Vec<String> {
        vec!["finance".to_string()]
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ticker_symbol": {
                    "type": "string",
                    "description": "The stock ticker (e.g., AAPL)"
                }
            },
            "required": ["ticker_symbol"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let ticker = args
            .get("ticker_symbol")
            .or_else(|| args.get("ticker"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or("Missing argument 'ticker_symbol'")?;
        let quote = self.source.quote(ticker).await.map_err(|e| e.to_string())?;
        serde_json::to_string(&quote).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> StockPriceTool {
        StockPriceTool::new(Arc::new(StaticQuotes::new().with("acme", 193.4, "USD")))
    }

    #[tokio::test]
    async fn test_known_ticker_case_insensitive() {
        let out = tool()
            .execute(serde_json::json!({"ticker_symbol": "Acme"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ticker"], "ACME");
        assert_eq!(v["price"], 193.4);
        assert_eq!(v["currency"], "USD");
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_soft_not_found() {
        let err = tool()
            .execute(serde_json::json!({"ticker_symbol": "ZZZZ"}))
            .await
            .unwrap_err();
        assert!(err.contains("ZZZZ"));
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_parse_chart_response() {
        let body = serde_json::json!({
            "chart": { "result": [ { "meta": { "regularMarketPrice": 12.5, "currency": "EUR" } } ] }
        });
        let q = parse_chart("SAP", &body).unwrap();
        assert_eq!(q.price, 12.5);
        assert_eq!(q.currency, "EUR");

        let empty = serde_json::json!({ "chart": { "result": [] } });
        assert_eq!(
            parse_chart("NOPE", &empty).unwrap_err(),
            QuoteError::NotFound("NOPE".to_string())
        );
    }

    #[test]
    fn test_static_quotes_from_config_table() {
        let mut prices = HashMap::new();
        prices.insert("msft".to_string(), 410.0);
        let q = StaticQuotes::from_prices(&prices);
        assert!(q.quotes.contains_key("MSFT"));
    }
}
