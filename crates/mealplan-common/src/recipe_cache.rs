/// Recipe detail cache keyed by `{meal}-{slot index}`.
///
/// Entries are JSON-serialized `CachedRecipeDetail` values, written on the first
/// successful detail fetch and never invalidated. All operations degrade gracefully:
/// a store failure or an undecodable entry is logged and treated as a miss.
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{CachedRecipeDetail, RecipeKey};
use crate::store::KeyValueStore;

pub struct RecipeCache {
    store: Arc<dyn KeyValueStore>,
}

impl RecipeCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &RecipeKey) -> Option<CachedRecipeDetail> {
        let raw = self
            .store
            .get(key.as_str())
            .await
            .inspect_err(|e| warn!(error = %e, key = %key, "recipe cache read failed"))
            .ok()??;
        let detail = serde_json::from_str(&raw)
            .inspect_err(|e| warn!(error = %e, key = %key, "cache deserialization failed"))
            .ok()?;
        debug!(key = %key, "recipe cache hit");
        Some(detail)
    }

    /// Returns `true` if the entry was written.
    pub async fn put(&self, key: &RecipeKey, detail: &CachedRecipeDetail) -> bool {
        let Ok(json) = serde_json::to_string(detail) else {
            return false;
        };
        self.store
            .put(key.as_str(), &json)
            .await
            .inspect_err(|e| warn!(error = %e, key = %key, "recipe cache write failed"))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MealSlot, RecipeDetails};
    use crate::store::tests::temp_path;
    use crate::store::{FileStore, MemoryStore, RedisStore};

    fn detail() -> CachedRecipeDetail {
        CachedRecipeDetail {
            details: RecipeDetails::Structured {
                ingredients: vec!["300g arborio rice".to_string(), "1l stock".to_string()],
                steps: vec!["1. Toast the rice".to_string(), "2. Add stock".to_string()],
            },
            image_url: "https://images.example/risotto.png".to_string(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_equal_value() {
        let cache = RecipeCache::new(Arc::new(MemoryStore::new()));
        let key = RecipeKey::new("Risotto", MealSlot::Dinner);
        assert!(cache.put(&key, &detail()).await);
        assert_eq!(cache.get(&key).await, Some(detail()));
    }

    #[tokio::test]
    async fn unwritten_key_is_absent() {
        let cache = RecipeCache::new(Arc::new(MemoryStore::new()));
        cache
            .put(&RecipeKey::new("Risotto", MealSlot::Dinner), &detail())
            .await;
        assert_eq!(cache.get(&RecipeKey::new("Risotto", MealSlot::Lunch)).await, None);
    }

    #[tokio::test]
    async fn stored_under_plain_key() {
        let store = Arc::new(MemoryStore::new());
        let cache = RecipeCache::new(store.clone());
        cache
            .put(&RecipeKey::new("Caprese Salad", MealSlot::Lunch), &detail())
            .await;
        let raw = store.get("Caprese Salad-1").await.unwrap().unwrap();
        let parsed: CachedRecipeDetail = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, detail());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.put("Risotto-2", "{ broken").await.unwrap();
        let cache = RecipeCache::new(store);
        assert_eq!(cache.get(&RecipeKey::new("Risotto", MealSlot::Dinner)).await, None);
    }

    #[tokio::test]
    async fn failed_write_reports_false() {
        let cache = RecipeCache::new(Arc::new(RedisStore::new(None)));
        let key = RecipeKey::new("Risotto", MealSlot::Dinner);
        assert!(!cache.put(&key, &detail()).await);
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn file_backed_entries_survive_restart() {
        let path = temp_path("recipes.json");
        let key = RecipeKey::new("Risotto", MealSlot::Dinner);
        {
            let cache = RecipeCache::new(Arc::new(FileStore::open(&path).await.unwrap()));
            assert!(cache.put(&key, &detail()).await);
        }
        let reopened = RecipeCache::new(Arc::new(FileStore::open(&path).await.unwrap()));
        assert_eq!(reopened.get(&key).await, Some(detail()));
        assert_eq!(reopened.get(&RecipeKey::new("Risotto", MealSlot::Lunch)).await, None);
    }
}
