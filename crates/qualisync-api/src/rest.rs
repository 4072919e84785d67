// REST query client
//
// Wraps `reqwest::Client` with the backend's URL conventions and error
// envelope. The surface is deliberately small: per-table select with
// simple filters / ordering / offset+limit paging, stored-procedure
// invocation by name, and row inserts (audit-trail appends). Requests
// resolve to typed success or typed failure, never a stray panic.

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::record::Record;
use crate::transport::TransportConfig;

/// Error body shape from the REST layer.
#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Async client for the backend's REST query interface.
///
/// Authentication headers (`apikey` + bearer token) are baked into the
/// underlying `reqwest::Client`, so one instance represents one session.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for the given backend with session credentials.
    pub fn new(
        base_url: Url,
        anon_key: &SecretString,
        access_token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let headers = TransportConfig::auth_headers(anon_key, access_token)?;
        let http = transport.build_client_with_headers(headers)?;
        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: Url, http: reqwest::Client) -> Self {
        Self { http, base_url }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Build `{base}/rest/v1/{path}`.
    fn rest_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/rest/v1/{path}"))?)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Start a select over `table`. Finish with [`SelectRequest::fetch`].
    pub fn select(&self, table: &str) -> SelectRequest<'_> {
        SelectRequest {
            client: self,
            table: table.to_owned(),
            columns: "*".to_owned(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    /// Invoke a stored procedure by name, returning its (scalar) result.
    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, params: &Value) -> Result<T, Error> {
        let url = self.rest_url(&format!("rpc/{function}"))?;
        debug!(%url, "POST rpc");

        let resp = self.http.post(url).json(params).send().await?;
        let resp = check_status(resp).await?;

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Insert a single row into `table`. The response body is discarded.
    pub async fn insert(&self, table: &str, row: &Value) -> Result<(), Error> {
        let url = self.rest_url(table)?;
        debug!(%url, "POST insert");

        let resp = self
            .http
            .post(url)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    pub(crate) async fn run_select(&self, req: &SelectRequest<'_>) -> Result<Vec<Record>, Error> {
        let url = self.rest_url(&req.table)?;
        debug!(%url, params = ?req.query_params(), "GET select");

        let resp = self
            .http
            .get(url)
            .query(&req.query_params())
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Classify a non-success response into the error taxonomy.
///
/// 401 is an authentication failure; everything else becomes
/// [`Error::Api`] with whatever `{message, code}` the body carried.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "session expired or invalid credentials".into(),
        });
    }

    let body = resp.text().await.unwrap_or_default();
    let parsed: ErrorResponse = serde_json::from_str(&body).unwrap_or(ErrorResponse {
        message: None,
        code: None,
    });

    Err(Error::Api {
        message: parsed
            .message
            .unwrap_or_else(|| format!("HTTP {} with no error body", status.as_u16())),
        code: parsed.code,
        status: status.as_u16(),
    })
}

// ── SelectRequest ───────────────────────────────────────────────────

/// Builder for a single select query.
pub struct SelectRequest<'a> {
    client: &'a RestClient,
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<(String, bool)>,
    limit: Option<u32>,
    offset: Option<u64>,
}

impl SelectRequest<'_> {
    /// Column / embedded-resource projection (defaults to `*`).
    pub fn columns(mut self, columns: &str) -> Self {
        columns.clone_into(&mut self.columns);
        self
    }

    /// Add an equality filter on `column`.
    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filters.push((column.to_owned(), format!("eq.{value}")));
        self
    }

    /// Order by `column`, ascending or descending.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_owned(), ascending));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Execute the query, returning the matching rows.
    pub async fn fetch(self) -> Result<Vec<Record>, Error> {
        self.client.run_select(&self).await
    }

    /// Render the builder state as query parameters.
    fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_owned(), self.columns.clone())];
        params.extend(self.filters.iter().cloned());
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_owned(), format!("{column}.{direction}")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_owned(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_owned(), offset.to_string()));
        }
        params
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::from_reqwest(
            Url::parse("https://backend.example").unwrap(),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn rest_url_joins_without_double_slash() {
        let c = client();
        assert_eq!(
            c.rest_url("personnel").unwrap().as_str(),
            "https://backend.example/rest/v1/personnel"
        );
        assert_eq!(
            c.rest_url("rpc/get_quarantine_count").unwrap().as_str(),
            "https://backend.example/rest/v1/rpc/get_quarantine_count"
        );
    }

    #[test]
    fn query_params_cover_all_clauses() {
        let c = client();
        let req = c
            .select("quality_costs")
            .columns("id, amount")
            .eq("cost_type", "internal")
            .order("created_at", false)
            .limit(1000)
            .offset(2000);

        assert_eq!(
            req.query_params(),
            vec![
                ("select".to_owned(), "id, amount".to_owned()),
                ("cost_type".to_owned(), "eq.internal".to_owned()),
                ("order".to_owned(), "created_at.desc".to_owned()),
                ("limit".to_owned(), "1000".to_owned()),
                ("offset".to_owned(), "2000".to_owned()),
            ]
        );
    }

    #[test]
    fn default_projection_is_star() {
        let c = client();
        let req = c.select("kpis");
        assert_eq!(req.query_params(), vec![("select".to_owned(), "*".to_owned())]);
    }
}
