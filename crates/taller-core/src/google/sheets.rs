//! Google Sheets API v4 Client

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::{extract_array, path_segment};
use crate::common::Error;

pub struct SheetsApi {
    client: GoogleClient,
    base_url: String,
}

super::google_api_wrapper!(SheetsApi);

impl SheetsApi {
    /// Read a range as row-major text cells.
    ///
    /// Rows may be ragged (Sheets drops trailing empty cells). An empty range
    /// yields no rows.
    pub async fn read(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, Error> {
        info!(%spreadsheet_id, %range, "Reading spreadsheet range");

        let url = self.values_url(spreadsheet_id, range);
        let response = self.client.get(&url, &[]).await?;

        let rows: Vec<Vec<String>> = extract_array(&response, "values")
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| cells.iter().map(cell_text).collect())
                    .unwrap_or_default()
            })
            .collect();

        debug!("Read {} rows", rows.len());
        Ok(rows)
    }

    /// Overwrite a range with raw (unparsed) values. Returns the number of
    /// cells Sheets reports as updated.
    pub async fn write(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<u64, Error> {
        info!(%spreadsheet_id, %range, rows = values.len(), "Writing spreadsheet range");

        let url = self.values_url(spreadsheet_id, range);
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        let query = [("valueInputOption", "RAW".to_string())];
        let response = self.client.put(&url, &query, &body).await?;

        Ok(response
            .get("updatedCells")
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url,
            path_segment(spreadsheet_id),
            path_segment(range)
        )
    }
}

/// Cells are normally strings; anything else is rendered as its JSON text.
fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> SheetsApi {
        let credential = Credential {
            access_token: "ya29.test".to_string(),
            token_type: "Bearer".to_string(),
            expiry: None,
        };
        SheetsApi::new(
            GoogleClient::new(reqwest::Client::new(), credential),
            &format!("{}/v4", server.uri()),
        )
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(42)), "42");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_read_returns_ragged_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/A1%3AC3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Sheet1!A1:C3",
                "majorDimension": "ROWS",
                "values": [["name", "qty", "price"], ["apple", "3"], [], ["pear", 2]]
            })))
            .mount(&server)
            .await;

        let rows = api(&server).read("sheet-1", "A1:C3").await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["name", "qty", "price"]);
        assert_eq!(rows[1], vec!["apple", "3"]);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec!["pear", "2"]);
    }

    #[tokio::test]
    async fn test_read_empty_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Sheet1!Z1:Z2",
                "majorDimension": "ROWS"
            })))
            .mount(&server)
            .await;

        assert!(api(&server).read("sheet-1", "Z1:Z2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_uses_raw_input_and_reports_cells() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/A1"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(json!({"values": [["a", "b"], ["c", "d"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-1",
                "updatedRange": "Sheet1!A1:B2",
                "updatedCells": 4
            })))
            .expect(1)
            .mount(&server)
            .await;

        let values = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
        ];
        assert_eq!(api(&server).write("sheet-1", "A1", &values).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_write_without_updated_cells_counts_zero() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"spreadsheetId": "sheet-1"})))
            .mount(&server)
            .await;

        assert_eq!(api(&server).write("sheet-1", "A1", &[]).await.unwrap(), 0);
    }
}
