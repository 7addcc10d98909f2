//! Category resolution: cache first, classifier on a miss.
//!
//! A failed or slow classification degrades to utility and is not cached, so
//! the next lookup for the same app tries again.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use focusrank_shared::types::{normalize_app_name, AppCategory};

use crate::classifier::Classifier;
use crate::db::{with_db, SharedDb};

/// Storage for resolved categories, keyed by normalised app name.
pub trait CategoryCache: Send + Sync {
    fn get(&self, app_name: &str) -> Option<AppCategory>;
    fn put(&self, category: &AppCategory);
}

#[derive(Default)]
pub struct MemoryCategoryCache {
    entries: RwLock<HashMap<String, AppCategory>>,
}

impl MemoryCategoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CategoryCache for MemoryCategoryCache {
    fn get(&self, app_name: &str) -> Option<AppCategory> {
        self.entries.read().ok()?.get(app_name).cloned()
    }

    fn put(&self, category: &AppCategory) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(category.app_name.clone(), category.clone());
        }
    }
}

/// Cache backed by the `app_categories` table, with an in-memory layer in
/// front so repeat lookups skip SQLite.
///
/// Store errors are logged and read as a miss; a failed write only costs a
/// repeat classification later.
pub struct StoreCategoryCache {
    db: SharedDb,
    hot: MemoryCategoryCache,
}

impl StoreCategoryCache {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            hot: MemoryCategoryCache::new(),
        }
    }
}

impl CategoryCache for StoreCategoryCache {
    fn get(&self, app_name: &str) -> Option<AppCategory> {
        if let Some(hit) = self.hot.get(app_name) {
            return Some(hit);
        }
        match with_db(&self.db, |db| db.get_app_category(app_name)) {
            Ok(found) => {
                if let Some(category) = &found {
                    self.hot.put(category);
                }
                found
            }
            Err(e) => {
                warn!(app = app_name, error = %e, "Category lookup failed");
                None
            }
        }
    }

    fn put(&self, category: &AppCategory) {
        match with_db(&self.db, |db| db.put_app_category(category)) {
            Ok(()) => self.hot.put(category),
            Err(e) => warn!(app = %category.app_name, error = %e, "Failed to cache category"),
        }
    }
}

pub struct CategoryResolver {
    cache: Arc<dyn CategoryCache>,
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl CategoryResolver {
    pub fn new(
        cache: Arc<dyn CategoryCache>,
        classifier: Arc<dyn Classifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            classifier,
            timeout,
        }
    }

    pub async fn resolve(&self, app_name: &str) -> AppCategory {
        let key = normalize_app_name(app_name);

        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        match tokio::time::timeout(self.timeout, self.classifier.classify(&key)).await {
            Ok(Ok(category)) => {
                let resolved = AppCategory::new(key, category);
                self.cache.put(&resolved);
                debug!(app = %resolved.app_name, category = %resolved.category, "Classified app");
                resolved
            }
            Ok(Err(e)) => {
                warn!(app = %key, error = %e, "Classification failed, treating app as utility");
                AppCategory::unresolved(key)
            }
            Err(_) => {
                warn!(
                    app = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Classification timed out, treating app as utility"
                );
                AppCategory::unresolved(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierError, KeywordClassifier};
    use focusrank_shared::types::Category;
    use focusrank_store::Database;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with a fixed result and counts how often it was asked.
    struct CountingClassifier {
        calls: AtomicUsize,
        answer: Option<Category>,
        delay: Duration,
    }

    impl CountingClassifier {
        fn new(answer: Option<Category>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for CountingClassifier {
        fn classify<'a>(
            &'a self,
            app_name: &'a str,
        ) -> BoxFuture<'a, Result<Category, ClassifierError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.answer
                    .ok_or_else(|| ClassifierError::Unknown(app_name.to_string()))
            }
            .boxed()
        }
    }

    fn resolver(
        cache: Arc<dyn CategoryCache>,
        classifier: Arc<dyn Classifier>,
    ) -> CategoryResolver {
        CategoryResolver::new(cache, classifier, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_miss_classifies_and_caches() {
        let cache = Arc::new(MemoryCategoryCache::new());
        let classifier = Arc::new(CountingClassifier::new(Some(Category::Productive)));
        let resolver = resolver(cache.clone(), classifier.clone());

        let first = resolver.resolve("  Xcode ").await;
        assert_eq!(first.app_name, "xcode");
        assert_eq!(first.category, Category::Productive);
        assert_eq!(first.multiplier, 1);

        let second = resolver.resolve("XCODE").await;
        assert_eq!(second, first);
        assert_eq!(classifier.calls(), 1);
        assert_eq!(cache.get("xcode"), Some(first));
    }

    #[tokio::test]
    async fn test_failure_degrades_without_caching() {
        let cache = Arc::new(MemoryCategoryCache::new());
        let classifier = Arc::new(CountingClassifier::new(None));
        let resolver = resolver(cache.clone(), classifier.clone());

        let resolved = resolver.resolve("Mystery").await;
        assert_eq!(resolved, AppCategory::unresolved("mystery"));
        assert!(cache.get("mystery").is_none());

        resolver.resolve("Mystery").await;
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_degrades_without_caching() {
        let cache = Arc::new(MemoryCategoryCache::new());
        let classifier = Arc::new(CountingClassifier {
            delay: Duration::from_secs(5),
            ..CountingClassifier::new(Some(Category::Unproductive))
        });
        let resolver = CategoryResolver::new(cache.clone(), classifier, Duration::from_millis(20));

        let resolved = resolver.resolve("slowapp").await;
        assert_eq!(resolved.category, Category::Utility);
        assert_eq!(resolved.multiplier, 0);
        assert!(cache.get("slowapp").is_none());
    }

    #[tokio::test]
    async fn test_store_cache_persists_across_resolvers() {
        let db = crate::db::shared(Database::open_in_memory().unwrap());
        let cache = Arc::new(StoreCategoryCache::new(db.clone()));

        let first = resolver(cache, Arc::new(KeywordClassifier::default()));
        assert_eq!(
            first.resolve("Instagram").await.category,
            Category::Unproductive
        );

        // A fresh cache over the same table answers without classifying.
        let second = resolver(
            Arc::new(StoreCategoryCache::new(db.clone())),
            Arc::new(CountingClassifier::new(None)),
        );
        assert_eq!(
            second.resolve("instagram").await.category,
            Category::Unproductive
        );

        let stored = with_db(&db, |db| db.get_app_category("instagram")).unwrap();
        assert_eq!(stored.map(|c| c.multiplier), Some(-1));
    }
}
