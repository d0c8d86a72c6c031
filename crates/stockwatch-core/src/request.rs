use serde_json::Value;

use crate::http_client::{HttpMethod, HttpRequest};

const JSON: &str = "application/json";

/// Immutable description of one service call.
///
/// The cache key is the path followed by the query parameters sorted by name,
/// so parameter order never produces distinct entries.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: HttpMethod,
    path: String,
    params: Vec<(String, String)>,
    body: Option<Value>,
    cache_key: String,
}

impl RequestDescriptor {
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        params: impl IntoIterator<Item = (String, String)>,
        body: Option<Value>,
    ) -> Self {
        let path = path.into();
        let params: Vec<(String, String)> = params.into_iter().collect();
        let cache_key = cache_key_for(&path, &params);
        Self {
            method,
            path,
            params,
            body,
            cache_key,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, Vec::new(), None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path, Vec::new(), Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path, Vec::new(), None)
    }

    /// Returns a copy with one more query parameter.
    pub fn with_param(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut params = self.params.clone();
        params.push((name.into(), value.into()));
        Self::new(self.method, self.path.clone(), params, self.body.clone())
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Builds the transport request for one attempt.
    pub fn to_http_request(&self, timeout_ms: u64) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, self.path.clone())
            .with_timeout_ms(timeout_ms)
            .with_header("accept", JSON);
        for (name, value) in &self.params {
            request = request.with_query(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            request = request
                .with_header("content-type", JSON)
                .with_body(body.to_string());
        }
        request
    }
}

fn cache_key_for(path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return path.to_owned();
    }

    let mut pairs: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect();
    pairs.sort();
    format!("{}?{}", path, pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_path_without_params() {
        assert_eq!(RequestDescriptor::get("/favorites").cache_key(), "/favorites");
    }

    #[test]
    fn cache_key_sorts_params() {
        let first = RequestDescriptor::get("/market_cap")
            .with_param("symbol", "000001")
            .with_param("period", "1y");
        let second = RequestDescriptor::get("/market_cap")
            .with_param("period", "1y")
            .with_param("symbol", "000001");

        assert_eq!(first.cache_key(), "/market_cap?period=1y&symbol=000001");
        assert_eq!(first.cache_key(), second.cache_key());
    }

    #[test]
    fn cache_key_encodes_values() {
        let descriptor = RequestDescriptor::get("/search").with_param("keyword", "平安 银行");

        assert_eq!(
            descriptor.cache_key(),
            "/search?keyword=%E5%B9%B3%E5%AE%89%20%E9%93%B6%E8%A1%8C"
        );
    }

    #[test]
    fn http_request_carries_body_and_timeout() {
        let descriptor =
            RequestDescriptor::post("/favorites", serde_json::json!({"stock_code": "000001"}));

        let request = descriptor.to_http_request(3_000);

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.timeout_ms, 3_000);
        assert_eq!(request.body.as_deref(), Some(r#"{"stock_code":"000001"}"#));
    }

    #[test]
    fn json_headers_follow_the_body() {
        let read = RequestDescriptor::get("/hot").to_http_request(3_000);
        let write =
            RequestDescriptor::post("/favorites", serde_json::json!({"stock_code": "000001"}))
                .to_http_request(3_000);

        assert_eq!(read.headers.get("accept").map(String::as_str), Some(JSON));
        assert!(!read.headers.contains_key("content-type"));
        assert_eq!(write.headers.get("content-type").map(String::as_str), Some(JSON));
    }
}
