//! App classifiers consulted by the category resolver on a cache miss.
//!
//! [`HttpClassifier`] calls an external classification service.
//! [`KeywordClassifier`] is the built-in fallback used when no service is
//! configured: case-insensitive substring rules, with `*` wildcards.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use focusrank_shared::types::Category;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Classifier returned status {0}")]
    Status(u16),

    #[error("Classifier response invalid: {0}")]
    InvalidResponse(String),

    #[error("No rule matches app {0:?}")]
    Unknown(String),
}

pub trait Classifier: Send + Sync {
    fn classify<'a>(&'a self, app_name: &'a str) -> BoxFuture<'a, Result<Category, ClassifierError>>;
}

// ---------------------------------------------------------------------------
// HTTP classifier
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    app_name: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    category: String,
    #[serde(default)]
    multiplier: Option<i8>,
}

pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn request(&self, app_name: &str) -> Result<Category, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { app_name })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }

        let body: ClassifyResponse = response.json().await?;
        let category: Category = body
            .category
            .parse()
            .map_err(|e| ClassifierError::InvalidResponse(format!("{e}")))?;

        if let Some(multiplier) = body.multiplier {
            if multiplier != category.multiplier() {
                debug!(
                    app = app_name,
                    %category,
                    multiplier,
                    "Classifier multiplier disagrees with category, using category"
                );
            }
        }

        Ok(category)
    }
}

impl Classifier for HttpClassifier {
    fn classify<'a>(&'a self, app_name: &'a str) -> BoxFuture<'a, Result<Category, ClassifierError>> {
        self.request(app_name).boxed()
    }
}

// ---------------------------------------------------------------------------
// Keyword classifier
// ---------------------------------------------------------------------------

pub struct KeywordClassifier {
    rules: Vec<(String, Category)>,
}

impl KeywordClassifier {
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (S, Category)>,
        S: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, category)| (pattern.into().to_lowercase(), category))
                .collect(),
        }
    }

    pub fn categorize(&self, app_name: &str) -> Option<Category> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern_matches(pattern, app_name))
            .map(|(_, category)| *category)
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        use Category::{Productive, Unproductive, Utility};
        Self::new([
            ("code", Productive),
            ("vim", Productive),
            ("terminal", Productive),
            ("intellij", Productive),
            ("xcode", Productive),
            ("notion", Productive),
            ("figma", Productive),
            ("docs", Productive),
            ("excel", Productive),
            ("word", Productive),
            ("slack", Productive),
            ("tiktok", Unproductive),
            ("instagram", Unproductive),
            ("youtube", Unproductive),
            ("netflix", Unproductive),
            ("twitch", Unproductive),
            ("reddit", Unproductive),
            ("facebook", Unproductive),
            ("snapchat", Unproductive),
            ("*game*", Unproductive),
            ("settings", Utility),
            ("maps", Utility),
            ("calculator", Utility),
            ("camera", Utility),
            ("clock", Utility),
            ("phone", Utility),
        ])
    }
}

impl Classifier for KeywordClassifier {
    fn classify<'a>(&'a self, app_name: &'a str) -> BoxFuture<'a, Result<Category, ClassifierError>> {
        let result = self
            .categorize(app_name)
            .ok_or_else(|| ClassifierError::Unknown(app_name.to_string()));
        futures::future::ready(result).boxed()
    }
}

fn pattern_matches(pattern: &str, text: &str) -> bool {
    let text = text.to_lowercase();

    if pattern.contains('*') {
        let mut pos = 0;
        for part in pattern.split('*').filter(|p| !p.is_empty()) {
            match text[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
        true
    } else {
        text.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    #[tokio::test]
    async fn test_keyword_rules() {
        let classifier = KeywordClassifier::default();
        assert_eq!(
            classifier.classify("Visual Studio Code").await.unwrap(),
            Category::Productive
        );
        assert_eq!(classifier.classify("TikTok").await.unwrap(), Category::Unproductive);
        assert_eq!(
            classifier.classify("Candy Crush Game").await.unwrap(),
            Category::Unproductive
        );
        assert_eq!(classifier.classify("Settings").await.unwrap(), Category::Utility);
        assert!(matches!(
            classifier.classify("Obscure App").await,
            Err(ClassifierError::Unknown(_))
        ));
    }

    #[test]
    fn test_wildcard_pattern() {
        assert!(pattern_matches("foo*bar", "xx FOO yy BAR"));
        assert!(!pattern_matches("foo*bar", "bar foo"));
        assert!(pattern_matches("slack", "Slack Desktop"));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/classify")
    }

    #[tokio::test]
    async fn test_http_classifier_parses_response() {
        let router = Router::new().route(
            "/classify",
            post(|Json(body): Json<serde_json::Value>| async move {
                let category = if body["app_name"] == "focusapp" {
                    "productive"
                } else {
                    "unproductive"
                };
                Json(serde_json::json!({ "category": category, "multiplier": 1 }))
            }),
        );
        let url = serve(router).await;
        let classifier = HttpClassifier::new(url);

        assert_eq!(
            classifier.classify("focusapp").await.unwrap(),
            Category::Productive
        );
        assert_eq!(
            classifier.classify("doomscroll").await.unwrap(),
            Category::Unproductive
        );
    }

    #[tokio::test]
    async fn test_http_classifier_surfaces_errors() {
        let router = Router::new().route(
            "/classify",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let url = serve(router).await;
        let classifier = HttpClassifier::new(url);
        assert!(matches!(
            classifier.classify("anything").await,
            Err(ClassifierError::Status(503))
        ));

        let bogus = Router::new().route(
            "/classify",
            post(|| async { Json(serde_json::json!({ "category": "mystery" })) }),
        );
        let classifier = HttpClassifier::new(serve(bogus).await);
        assert!(matches!(
            classifier.classify("anything").await,
            Err(ClassifierError::InvalidResponse(_))
        ));
    }
}
