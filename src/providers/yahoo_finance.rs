use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::CurrencyRateProvider;
use crate::core::error::FetchError;
use crate::core::fundamentals::{Fundamentals, FundamentalsProvider};

const USER_AGENT: &str = "fairval/1.0";
const QUOTE_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics";

fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

// YahooFundamentalsProvider implementation for FundamentalsProvider
pub struct YahooFundamentalsProvider {
    base_url: String,
}

impl YahooFundamentalsProvider {
    pub fn new(base_url: &str) -> Self {
        YahooFundamentalsProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Deserialize, Debug)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryItem>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryItem {
    #[serde(default)]
    price: PriceModule,
    #[serde(default)]
    summary_detail: SummaryDetailModule,
    #[serde(default)]
    financial_data: FinancialDataModule,
    #[serde(default)]
    default_key_statistics: KeyStatisticsModule,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, or `{}` when unknown.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
struct RawValue {
    raw: Option<f64>,
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw).filter(|v| v.is_finite())
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
    currency: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    previous_close: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    financial_currency: Option<String>,
    current_price: Option<RawValue>,
    total_debt: Option<RawValue>,
    total_cash: Option<RawValue>,
    ebitda: Option<RawValue>,
    total_revenue: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    shares_outstanding: Option<RawValue>,
    implied_shares_outstanding: Option<RawValue>,
    float_shares: Option<RawValue>,
    trailing_eps: Option<RawValue>,
}

/// Maps one quoteSummary result onto [`Fundamentals`]. Price falls back from the
/// current price to the market price to the previous close; shares from outstanding
/// to implied to float. Statement figures keep `financialCurrency`, which can differ
/// from the quote currency (pence quotes report statements in pounds).
fn to_fundamentals(symbol: &str, item: QuoteSummaryItem) -> Result<Fundamentals, FetchError> {
    let price = [
        raw(&item.financial_data.current_price),
        raw(&item.price.regular_market_price),
        raw(&item.summary_detail.previous_close),
        raw(&item.price.regular_market_previous_close),
    ]
    .into_iter()
    .flatten()
    .find(|p| *p > 0.0)
    .ok_or_else(|| FetchError::MissingPrice(symbol.to_string()))?;

    let stats = &item.default_key_statistics;
    let shares = [
        raw(&stats.shares_outstanding),
        raw(&stats.implied_shares_outstanding),
        raw(&stats.float_shares),
    ]
    .into_iter()
    .flatten()
    .find(|s| *s > 0.0);

    let currency = item
        .price
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "USD".to_string());

    let mut fundamentals = Fundamentals::new(symbol, &currency, price);
    fundamentals.financial_currency = item
        .financial_data
        .financial_currency
        .filter(|c| !c.trim().is_empty());
    fundamentals.name = item.price.long_name.or(item.price.short_name);
    fundamentals.shares = shares;
    fundamentals.debt = raw(&item.financial_data.total_debt);
    fundamentals.cash = raw(&item.financial_data.total_cash);
    fundamentals.ebitda = raw(&item.financial_data.ebitda);
    fundamentals.revenue = raw(&item.financial_data.total_revenue);
    fundamentals.eps = raw(&stats.trailing_eps);
    Ok(fundamentals)
}

#[async_trait]
impl FundamentalsProvider for YahooFundamentalsProvider {
    #[instrument(
        name = "YahooFundamentalsFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        let unreachable = |reason: String| FetchError::Unreachable {
            ticker: symbol.to_string(),
            reason,
        };

        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}",
            self.base_url, symbol, QUOTE_MODULES
        );
        debug!("Requesting fundamentals from {}", url);

        let client = client().map_err(|e| unreachable(e.to_string()))?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(format!("request error: {e}")))?;

        debug!(response = ?response, "Received Yahoo response");

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::UnknownTicker(symbol.to_string())),
            status if !status.is_success() => {
                return Err(unreachable(format!("HTTP error: {status}")));
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| unreachable(format!("failed to read response: {e}")))?;
        let data: QuoteSummaryResponse = serde_json::from_str(&text)
            .map_err(|e| unreachable(format!("failed to parse response: {e}")))?;

        let item = data
            .quote_summary
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| FetchError::UnknownTicker(symbol.to_string()))?;

        to_fundamentals(symbol, item)
    }
}

// YahooCurrencyProvider implementation for CurrencyRateProvider
pub struct YahooCurrencyProvider {
    base_url: String,
}

impl YahooCurrencyProvider {
    pub fn new(base_url: &str) -> Self {
        YahooCurrencyProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YahooCurrencyResponse {
    chart: CurrencyChartResult,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartResult {
    result: Vec<CurrencyChartItem>,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartItem {
    meta: CurrencyChartMeta,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
}

#[async_trait]
impl CurrencyRateProvider for YahooCurrencyProvider {
    #[instrument(name = "YahooRateFetch", skip(self))]
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        let symbol = format!("{from}{to}=X");
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        debug!("Requesting currency rate from {}", url);

        let response = client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, symbol))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;

        let data: YahooCurrencyResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let item = data
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", symbol))?;

        Ok(item.meta.regular_market_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(symbol: &str, status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v10/finance/quoteSummary/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .and(query_param("modules", QUOTE_MODULES))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    #[tokio::test]
    async fn test_successful_fundamentals_fetch() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 101.5, "fmt": "101.50"},
                        "currency": "USD",
                        "longName": "Example Corp",
                        "shortName": "EXAMPLE"
                    },
                    "financialData": {
                        "currentPrice": {"raw": 100.0, "fmt": "100.00"},
                        "totalDebt": {"raw": 5000000.0},
                        "totalCash": {"raw": 2000000.0},
                        "ebitda": {"raw": 10000000.0},
                        "totalRevenue": {"raw": 50000000.0}
                    },
                    "defaultKeyStatistics": {
                        "sharesOutstanding": {"raw": 1000000.0},
                        "trailingEps": {"raw": 6.25}
                    }
                }],
                "error": null
            }
        }"#;

        let mock_server = create_mock_server("EXM", 200, mock_response).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let f = provider.fetch_fundamentals("EXM").await.unwrap();

        assert_eq!(f.ticker, "EXM");
        assert_eq!(f.name.as_deref(), Some("Example Corp"));
        assert_eq!(f.currency, "USD");
        assert_eq!(f.price, 100.0);
        assert_eq!(f.shares, Some(1_000_000.0));
        assert_eq!(f.debt, Some(5_000_000.0));
        assert_eq!(f.cash, Some(2_000_000.0));
        assert_eq!(f.ebitda, Some(10_000_000.0));
        assert_eq!(f.revenue, Some(50_000_000.0));
        assert_eq!(f.eps, Some(6.25));
        assert!(f.financial_currency.is_none());
        assert!(f.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_statement_currency_is_carried() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 300.0},
                        "currency": "GBp",
                        "longName": "Tesco PLC"
                    },
                    "financialData": {
                        "financialCurrency": "GBP",
                        "ebitda": {"raw": 4000000000.0}
                    },
                    "defaultKeyStatistics": {"trailingEps": {"raw": 0.15}}
                }]
            }
        }"#;

        let mock_server = create_mock_server("TSCO.L", 200, mock_response).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let f = provider.fetch_fundamentals("TSCO.L").await.unwrap();

        assert_eq!(f.currency, "GBp");
        assert_eq!(f.financial_currency.as_deref(), Some("GBP"));
        assert_eq!(f.price, 300.0);
        assert_eq!(f.eps, Some(0.15));
    }

    #[tokio::test]
    async fn test_price_and_shares_fallbacks() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {"regularMarketPrice": {}, "shortName": "Fallback SA"},
                    "summaryDetail": {"previousClose": {"raw": 42.0}},
                    "financialData": {"currentPrice": {}},
                    "defaultKeyStatistics": {
                        "sharesOutstanding": {},
                        "impliedSharesOutstanding": {"raw": 0.0},
                        "floatShares": {"raw": 800.0}
                    }
                }]
            }
        }"#;

        let mock_server = create_mock_server("FB.PA", 200, mock_response).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let f = provider.fetch_fundamentals("FB.PA").await.unwrap();

        assert_eq!(f.price, 42.0);
        assert_eq!(f.shares, Some(800.0));
        assert_eq!(f.name.as_deref(), Some("Fallback SA"));
        // Missing currency defaults to USD
        assert_eq!(f.currency, "USD");
        assert!(f.debt.is_none());
        assert!(f.eps.is_none());
    }

    #[tokio::test]
    async fn test_missing_price() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {"currency": "EUR"},
                    "financialData": {"ebitda": {"raw": 10.0}}
                }]
            }
        }"#;

        let mock_server = create_mock_server("NOPX", 200, mock_response).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let result = provider.fetch_fundamentals("NOPX").await;
        assert_eq!(result, Err(FetchError::MissingPrice("NOPX".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_ticker() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": null,
                "error": {"code": "Not Found", "description": "Quote not found for ticker symbol: NOPE"}
            }
        }"#;

        let mock_server = create_mock_server("NOPE", 404, mock_response).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let result = provider.fetch_fundamentals("NOPE").await;
        assert_eq!(result, Err(FetchError::UnknownTicker("NOPE".to_string())));

        let mock_server =
            create_mock_server("EMPTY", 200, r#"{"quoteSummary": {"result": []}}"#).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let result = provider.fetch_fundamentals("EMPTY").await;
        assert_eq!(result, Err(FetchError::UnknownTicker("EMPTY".to_string())));
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let mock_server = create_mock_server("ERR", 500, "").await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let err = provider.fetch_fundamentals("ERR").await.unwrap_err();

        assert!(matches!(err, FetchError::Unreachable { ref ticker, .. } if ticker == "ERR"));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_unreachable() {
        let mock_server = create_mock_server("BAD", 200, r#"{"quoteSummary": 1}"#).await;
        let provider = YahooFundamentalsProvider::new(&mock_server.uri());
        let err = provider.fetch_fundamentals("BAD").await.unwrap_err();
        assert!(err.to_string().contains("failed to parse response"));
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_server = MockServer::start().await;
        let provider = YahooCurrencyProvider::new(&mock_server.uri());

        let mock_response = r#"{
            "chart": {
                "result": [
                    {
                        "meta": {
                            "regularMarketPrice": 0.92
                        }
                    }
                ]
            }
        }"#;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/USDEUR=X"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        let rate = provider
            .get_rate("USD", "EUR")
            .await
            .expect("Failed to get rate");
        assert_eq!(rate, 0.92);
    }

    #[tokio::test]
    async fn test_no_currency_rate_found() {
        let mock_server = MockServer::start().await;
        let provider = YahooCurrencyProvider::new(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/PLNEUR=X"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"chart": {"result": []}}"#),
            )
            .mount(&mock_server)
            .await;

        let result = provider.get_rate("PLN", "EUR").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No rate data found for currency pair: PLNEUR=X"
        );
    }

    #[tokio::test]
    async fn test_yahoo_currency_api_error_response() {
        let mock_server = MockServer::start().await;
        let provider = YahooCurrencyProvider::new(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/USDEUR=X"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let result = provider.get_rate("USD", "EUR").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for currency pair: USDEUR=X"
        );
    }
}
