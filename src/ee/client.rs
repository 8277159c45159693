//! Earth Engine REST client abstraction for testability.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value as Json, json};
use thiserror::Error;
use tracing::debug;

use super::auth::TokenProvider;
use super::expr::Expression;
use crate::core::coords::Crs;

/// High-volume endpoint, meant for automated bulk requests.
pub const DEFAULT_BASE_URL: &str = "https://earthengine-highvolume.googleapis.com/v1";

/// Errors returned by Earth Engine requests
#[derive(Debug, Clone, Error)]
pub enum EeError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Earth Engine API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Earth Engine quota exceeded: {0}")]
    Quota(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl EeError {
    /// The request was refused because of its size or memory footprint; a smaller
    /// region may succeed.
    pub fn is_too_large(&self) -> bool {
        match self {
            EeError::Api { message, .. } => {
                let m = message.to_lowercase();
                m.contains("user memory limit exceeded")
                    || m.contains("total request size")
                    || m.contains("too large")
                    || m.contains("no space left on device")
                    || m.contains("must be less than or equal to")
            }
            _ => false,
        }
    }
}

/// Pixel grid of a `computePixels` request.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub width: usize,
    pub height: usize,
    /// `[scaleX, shearX, translateX, shearY, scaleY, translateY]`
    pub affine: [f64; 6],
    pub crs: Crs,
}

impl PixelGrid {
    /// GDAL ordering of the same affine transform.
    pub fn geo_transform(&self) -> [f64; 6] {
        let a = self.affine;
        [a[2], a[0], a[1], a[5], a[3], a[4]]
    }
}

#[derive(Debug, Clone)]
pub struct PixelsRequest {
    pub expression: Expression,
    pub band_ids: Vec<String>,
    pub grid: PixelGrid,
}

impl PixelsRequest {
    pub fn to_json(&self) -> Json {
        let a = self.grid.affine;
        json!({
            "expression": self.expression,
            "fileFormat": "GEO_TIFF",
            "bandIds": self.band_ids,
            "grid": {
                "dimensions": { "width": self.grid.width, "height": self.grid.height },
                "affineTransform": {
                    "scaleX": a[0], "shearX": a[1], "translateX": a[2],
                    "shearY": a[3], "scaleY": a[4], "translateY": a[5],
                },
                "crsCode": self.grid.crs.code(),
            },
        })
    }
}

/// One page of a `table:computeFeatures` response.
#[derive(Debug, Clone, Default)]
pub struct FeaturePage {
    pub features: Vec<Json>,
    pub next_page_token: Option<String>,
}

/// Trait for Earth Engine operations.
///
/// Satellites and downloaders only see this trait, so tests can swap in a mock.
pub trait EarthEngineApi: Send + Sync {
    /// Evaluate an expression and return its JSON value (`value:compute`).
    fn compute_value(&self, expression: &Expression) -> Result<Json, EeError>;

    /// Render an image expression on a pixel grid as GeoTIFF bytes (`image:computePixels`).
    fn compute_pixels(&self, request: &PixelsRequest) -> Result<Vec<u8>, EeError>;

    /// Fetch one page of features (`table:computeFeatures`).
    fn compute_features(
        &self,
        expression: &Expression,
        page_token: Option<&str>,
    ) -> Result<FeaturePage, EeError>;

    /// Fetch every page of features.
    fn compute_all_features(&self, expression: &Expression) -> Result<Vec<Json>, EeError> {
        let mut features = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.compute_features(expression, token.as_deref())?;
            features.extend(page.features);
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(features)
    }
}

/// Blocking REST client. Requests rotate over the configured project IDs.
pub struct RestClient {
    client: reqwest::blocking::Client,
    base_url: String,
    projects: Vec<String>,
    next_project: AtomicUsize,
    token: TokenProvider,
}

impl RestClient {
    pub fn new(projects: Vec<String>, token: TokenProvider) -> Result<Self, EeError> {
        Self::with_base_url(DEFAULT_BASE_URL, projects, token)
    }

    pub fn with_base_url(
        base_url: &str,
        projects: Vec<String>,
        token: TokenProvider,
    ) -> Result<Self, EeError> {
        if projects.is_empty() {
            return Err(EeError::Auth(
                "at least one Earth Engine project id is required".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| EeError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            projects,
            next_project: AtomicUsize::new(0),
            token,
        })
    }

    fn project(&self) -> &str {
        let i = self.next_project.fetch_add(1, Ordering::Relaxed) % self.projects.len();
        &self.projects[i]
    }

    fn post(&self, method: &str, body: &Json) -> Result<reqwest::blocking::Response, EeError> {
        let project = self.project();
        let url = format!("{}/projects/{}/{}", self.base_url, project, method);
        debug!("POST {}", url);
        let token = self.token.token()?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("x-goog-user-project", project)
            .json(body)
            .send()
            .map_err(|e| EeError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<Json>(&text)
            .ok()
            .and_then(|j| j["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        if status.as_u16() == 429 {
            return Err(EeError::Quota(message));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(EeError::Auth(message));
        }
        Err(EeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl EarthEngineApi for RestClient {
    fn compute_value(&self, expression: &Expression) -> Result<Json, EeError> {
        let response = self.post("value:compute", &json!({ "expression": expression }))?;
        let body: Json = response
            .json()
            .map_err(|e| EeError::Decode(format!("Failed to read response: {}", e)))?;
        Ok(body.get("result").cloned().unwrap_or(Json::Null))
    }

    fn compute_pixels(&self, request: &PixelsRequest) -> Result<Vec<u8>, EeError> {
        let response = self.post("image:computePixels", &request.to_json())?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| EeError::Http(format!("Failed to read response: {}", e)))
    }

    fn compute_features(
        &self,
        expression: &Expression,
        page_token: Option<&str>,
    ) -> Result<FeaturePage, EeError> {
        let mut body = json!({ "expression": expression });
        if let Some(token) = page_token {
            body["pageToken"] = json!(token);
        }
        let response = self.post("table:computeFeatures", &body)?;
        let body: Json = response
            .json()
            .map_err(|e| EeError::Decode(format!("Failed to read response: {}", e)))?;
        let features = body["features"].as_array().cloned().unwrap_or_default();
        let next_page_token = body["nextPageToken"].as_str().map(str::to_string);
        Ok(FeaturePage {
            features,
            next_page_token,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Mock Earth Engine client: scripted responses, recorded requests.
    #[derive(Default)]
    pub struct MockEarthEngine {
        pub values: Mutex<VecDeque<Result<Json, EeError>>>,
        pub pixels: Mutex<VecDeque<Result<Vec<u8>, EeError>>>,
        pub pages: Mutex<VecDeque<Result<FeaturePage, EeError>>>,
        pub pixel_requests: Mutex<Vec<PixelsRequest>>,
        pub value_requests: Mutex<Vec<Expression>>,
    }

    impl MockEarthEngine {
        pub fn push_value(&self, v: Result<Json, EeError>) {
            self.values.lock().unwrap().push_back(v);
        }

        pub fn push_pixels(&self, v: Result<Vec<u8>, EeError>) {
            self.pixels.lock().unwrap().push_back(v);
        }

        pub fn push_page(&self, v: Result<FeaturePage, EeError>) {
            self.pages.lock().unwrap().push_back(v);
        }
    }

    impl EarthEngineApi for MockEarthEngine {
        fn compute_value(&self, expression: &Expression) -> Result<Json, EeError> {
            self.value_requests.lock().unwrap().push(expression.clone());
            self.values
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Json::Null))
        }

        fn compute_pixels(&self, request: &PixelsRequest) -> Result<Vec<u8>, EeError> {
            self.pixel_requests.lock().unwrap().push(request.clone());
            self.pixels
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EeError::Http("no scripted response".into())))
        }

        fn compute_features(
            &self,
            _expression: &Expression,
            _page_token: Option<&str>,
        ) -> Result<FeaturePage, EeError> {
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(FeaturePage::default()))
        }
    }

    #[test]
    fn test_too_large_classification() {
        let e = EeError::Api {
            status: 400,
            message: "User memory limit exceeded.".into(),
        };
        assert!(e.is_too_large());
        let e = EeError::Api {
            status: 400,
            message: "Total request size (60000000 bytes) must be less than or equal to 50331648 bytes.".into(),
        };
        assert!(e.is_too_large());
        assert!(!EeError::Quota("x".into()).is_too_large());
    }

    #[test]
    fn test_pages_are_concatenated() {
        let mock = MockEarthEngine::default();
        mock.push_page(Ok(FeaturePage {
            features: vec![json!({"id": 1})],
            next_page_token: Some("t".into()),
        }));
        mock.push_page(Ok(FeaturePage {
            features: vec![json!({"id": 2})],
            next_page_token: None,
        }));
        let expr = Expression::new(&crate::ee::Value::constant(0));
        let all = mock.compute_all_features(&expr).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_pixels_request_json() {
        let req = PixelsRequest {
            expression: Expression::new(&crate::ee::Value::constant(0)),
            band_ids: vec!["VV".into()],
            grid: PixelGrid {
                width: 500,
                height: 400,
                affine: [10.0, 0.0, 650_000.0, 0.0, -10.0, 6_865_000.0],
                crs: Crs(2154),
            },
        };
        let j = req.to_json();
        assert_eq!(j["grid"]["crsCode"], "EPSG:2154");
        assert_eq!(j["grid"]["dimensions"]["width"], 500);
        assert_eq!(j["fileFormat"], "GEO_TIFF");
        assert_eq!(
            req.grid.geo_transform(),
            [650_000.0, 10.0, 0.0, 6_865_000.0, 0.0, -10.0]
        );
    }

    #[test]
    fn test_rest_client_requires_project() {
        assert!(RestClient::new(vec![], TokenProvider::Static("t".into())).is_err());
    }
}
