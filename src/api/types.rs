//! Response types for the Yahoo Finance chart endpoint.

use serde::Deserialize;

/// Envelope returned by `/v8/finance/chart/{symbol}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartBody {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    /// Bar open times, unix seconds
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: Indicators,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    /// Unix seconds of `regular_market_price`
    #[serde(default)]
    pub regular_market_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteIndicator>,
}

/// Per-bar series. Yahoo leaves gaps as `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteIndicator {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Closes and volumes with null bars dropped, oldest first.
    pub fn bars(&self) -> (Vec<f64>, Vec<f64>) {
        let Some(series) = self.indicators.quote.first() else {
            return (Vec::new(), Vec::new());
        };

        series
            .close
            .iter()
            .enumerate()
            .filter_map(|(i, close)| {
                let close = (*close)?;
                let volume = series.volume.get(i).copied().flatten().unwrap_or(0.0);
                Some((close, volume))
            })
            .unzip()
    }

    /// Live price, falling back to the most recent close.
    pub fn last_price(&self) -> Option<f64> {
        self.meta
            .regular_market_price
            .or_else(|| self.bars().0.last().copied())
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "currency": "USD", "regularMarketPrice": 189.5, "regularMarketTime": 1772467200},
                "timestamp": [1, 2, 3],
                "indicators": {"quote": [{"close": [187.0, null, 189.5], "volume": [1000, 1200, null]}]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_response() {
        let response: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let result = &response.chart.result.unwrap()[0];

        assert_eq!(result.meta.regular_market_time, Some(1772467200));
        assert_eq!(result.last_price(), Some(189.5));

        let (closes, volumes) = result.bars();
        assert_eq!(closes, vec![187.0, 189.5]);
        assert_eq!(volumes, vec![1000.0, 0.0]);
    }

    #[test]
    fn test_last_price_falls_back_to_close() {
        let json = r#"{"meta": {"symbol": "X"}, "indicators": {"quote": [{"close": [1.0, 2.5]}]}}"#;
        let result: ChartResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.last_price(), Some(2.5));
    }

    #[test]
    fn test_parse_error_envelope() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let response: ChartResponse = serde_json::from_str(json).unwrap();
        assert!(response.chart.result.is_none());
        assert_eq!(response.chart.error.unwrap().code, "Not Found");
    }
}
