use std::fmt::Write as _;

use fira_models::FredConfig;
use fira_store::OutputStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::AgentError;

#[derive(Debug, Deserialize)]
pub struct FredSeriesArgs {
    pub series_id: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub download_csv: bool,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Client for the FRED series-observations endpoint.
#[derive(Debug, Clone)]
pub struct FredClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FredClient {
    pub fn new(http: reqwest::Client, config: &FredConfig, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Fetch a series and summarise it; optionally save it as CSV in the
    /// store. Provider problems come back as error objects.
    pub async fn series(
        &self,
        store: &OutputStore,
        args: FredSeriesArgs,
    ) -> Result<Value, AgentError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(json!({
                "error": "FRED_API_KEY is not set",
                "series_id": args.series_id,
            }));
        };

        let mut query = vec![
            ("series_id", args.series_id.as_str()),
            ("api_key", api_key),
            ("file_type", "json"),
        ];
        if !args.start_date.is_empty() {
            query.push(("observation_start", args.start_date.as_str()));
        }
        if !args.end_date.is_empty() {
            query.push(("observation_end", args.end_date.as_str()));
        }

        debug!(series = %args.series_id, "Fetching FRED series");
        let response = self
            .http
            .get(format!("{}/series/observations", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(series = %args.series_id, %status, "FRED request failed");
            return Ok(json!({
                "error": format!("FRED request failed ({status}): {text}"),
                "series_id": args.series_id,
            }));
        }

        let body: ObservationsResponse = response.json().await?;
        let points: Vec<(String, f64)> = body
            .observations
            .into_iter()
            .filter_map(|o| o.value.parse::<f64>().ok().map(|v| (o.date, v)))
            .collect();

        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Ok(json!({
                "error": "Series not found or empty",
                "series_id": args.series_id,
            }));
        };

        let mean = points.iter().map(|(_, v)| v).sum::<f64>() / points.len() as f64;
        let mut summary = json!({
            "series_id": args.series_id,
            "observations": points.len(),
            "start": first.0,
            "end": last.0,
            "latest": last.1,
            "mean": mean,
        });

        if args.download_csv {
            let file = csv_filename(&args.series_id, &args.start_date, &args.end_date);
            let mut csv = format!("Date,{}\n", args.series_id);
            for (date, value) in &points {
                let _ = writeln!(csv, "{date},{value}");
            }
            std::fs::write(store.resolve(&file)?, csv)?;
            summary["file"] = json!(file);
            summary["schema"] = json!(["Date", args.series_id]);
        }

        Ok(summary)
    }
}

fn csv_filename(series_id: &str, start: &str, end: &str) -> String {
    format!(
        "{series_id}_{}_{}.csv",
        start.replace('-', ""),
        end.replace('-', "")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_name_drops_dashes() {
        assert_eq!(
            csv_filename("GDP", "2020-01-01", "2024-06-30"),
            "GDP_20200101_20240630.csv"
        );
        assert_eq!(csv_filename("UNRATE", "", ""), "UNRATE__.csv");
    }

    #[tokio::test]
    async fn missing_key_is_error_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        let client = FredClient::new(reqwest::Client::new(), &FredConfig::default(), None);
        let value = client
            .series(
                &store,
                FredSeriesArgs {
                    series_id: "GDP".to_string(),
                    start_date: String::new(),
                    end_date: String::new(),
                    download_csv: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(value["series_id"], "GDP");
        assert!(value["error"].as_str().unwrap().contains("FRED_API_KEY"));
    }
}
