/// Recipe detail resolution.
///
/// A click on a recipe moves the detail view `Idle -> Loading -> Resolved | Failed`.
/// The cache is consulted first; on a miss the resolver fetches `/get_recipe`, stores the
/// result and hands it to the view. Concurrent requests for the same key join a single
/// in-flight fetch instead of issuing their own.
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiError, MealPlanApi};
use crate::model::{CachedRecipeDetail, MealSlot, Recipe, RecipeDetails, RecipeKey, RecipeRequest};
use crate::recipe_cache::RecipeCache;

type FetchOutcome = Result<CachedRecipeDetail, Arc<ApiError>>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("recipe details unavailable: {0}")]
    Fetch(Arc<ApiError>),
}

/// Everything the detail view needs to render a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RecipeView {
    pub recipe: Recipe,
    pub details: RecipeDetails,
    pub image_url: String,
    pub slot: MealSlot,
}

impl RecipeView {
    pub fn new(recipe: Recipe, slot: MealSlot, detail: CachedRecipeDetail) -> Self {
        Self {
            recipe,
            details: detail.details,
            image_url: detail.image_url,
            slot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Resolution {
    pub view: RecipeView,
    pub source: Source,
}

/// State of the recipe detail view.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DetailState {
    #[default]
    Idle,
    Loading {
        key: RecipeKey,
    },
    Resolved(Resolution),
    Failed {
        key: RecipeKey,
        message: String,
    },
}

impl DetailState {
    pub fn is_loading(&self) -> bool {
        matches!(self, DetailState::Loading { .. })
    }

    pub fn start(key: RecipeKey) -> Self {
        DetailState::Loading { key }
    }

    /// Leave `Loading` with the outcome of a resolution. Any other state is kept: a
    /// completion that arrives after the view moved on is dropped.
    pub fn complete(self, outcome: Result<Resolution, ResolveError>) -> Self {
        match (self, outcome) {
            (DetailState::Loading { .. }, Ok(resolution)) => DetailState::Resolved(resolution),
            (DetailState::Loading { key }, Err(e)) => DetailState::Failed {
                key,
                message: e.to_string(),
            },
            (other, _) => other,
        }
    }
}

pub struct RecipeResolver {
    api: Arc<dyn MealPlanApi>,
    cache: Arc<RecipeCache>,
    in_flight: Arc<Mutex<HashMap<RecipeKey, SharedFetch>>>,
}

impl RecipeResolver {
    pub fn new(api: Arc<dyn MealPlanApi>, cache: Arc<RecipeCache>) -> Self {
        Self {
            api,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn resolve(&self, recipe: &Recipe, slot: MealSlot) -> Result<Resolution, ResolveError> {
        let key = RecipeKey::new(&recipe.meal, slot);

        if let Some(detail) = self.cache.get(&key).await {
            return Ok(Resolution {
                view: RecipeView::new(recipe.clone(), slot, detail),
                source: Source::Cache,
            });
        }

        let fetch = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(pending) = in_flight.get(&key) {
                debug!(key = %key, "joining in-flight recipe fetch");
                pending.clone()
            } else {
                // A fetch may have finished between the first lookup and taking the lock.
                if let Some(detail) = self.cache.get(&key).await {
                    return Ok(Resolution {
                        view: RecipeView::new(recipe.clone(), slot, detail),
                        source: Source::Cache,
                    });
                }
                let fetch = self.start_fetch(key.clone(), RecipeRequest::from(recipe));
                in_flight.insert(key.clone(), fetch.clone());
                fetch
            }
        };

        let detail = fetch.await.map_err(ResolveError::Fetch)?;
        Ok(Resolution {
            view: RecipeView::new(recipe.clone(), slot, detail),
            source: Source::Network,
        })
    }

    fn start_fetch(&self, key: RecipeKey, request: RecipeRequest) -> SharedFetch {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        async move {
            info!(key = %key, meal = %request.meal, "fetching recipe details");
            let outcome = api.get_recipe(&request).await.map_err(Arc::new);
            match &outcome {
                Ok(detail) => {
                    cache.put(&key, detail).await;
                }
                Err(e) => warn!(error = %e, key = %key, "recipe fetch failed"),
            }
            in_flight.lock().await.remove(&key);
            outcome
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{WeekPlan, WeekRequest};
    use crate::store::MemoryStore;

    /// Counts calls; optionally delays and fails `/get_recipe`.
    #[derive(Default)]
    pub(crate) struct FakeApi {
        pub recipe_calls: AtomicUsize,
        pub week_calls: AtomicUsize,
        pub delay: Option<Duration>,
        pub fail: bool,
        pub week: Option<WeekPlan>,
    }

    pub(crate) fn fake_detail(meal: &str) -> CachedRecipeDetail {
        CachedRecipeDetail {
            details: RecipeDetails::Structured {
                ingredients: vec![format!("ingredients for {meal}")],
                steps: vec!["1. Cook".to_string()],
            },
            image_url: format!("https://images.example/{meal}.png"),
        }
    }

    #[async_trait]
    impl MealPlanApi for FakeApi {
        async fn get_week(&self, _request: &WeekRequest) -> Result<WeekPlan, ApiError> {
            self.week_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match (&self.week, self.fail) {
                (Some(week), false) => Ok(week.clone()),
                _ => Err(ApiError::Upstream {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal Server Error".to_string(),
                }),
            }
        }

        async fn get_recipe(&self, request: &RecipeRequest) -> Result<CachedRecipeDetail, ApiError> {
            self.recipe_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ApiError::Upstream {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal Server Error".to_string(),
                });
            }
            Ok(fake_detail(&request.meal))
        }
    }

    fn risotto() -> Recipe {
        Recipe {
            meal: "Risotto".to_string(),
            description: "Mushroom risotto".to_string(),
        }
    }

    fn resolver(api: Arc<FakeApi>) -> (RecipeResolver, Arc<RecipeCache>) {
        let cache = Arc::new(RecipeCache::new(Arc::new(MemoryStore::new())));
        (RecipeResolver::new(api, Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn miss_fetches_then_stores() {
        let api = Arc::new(FakeApi::default());
        let (resolver, cache) = resolver(Arc::clone(&api));

        let resolution = resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap();
        assert_eq!(resolution.source, Source::Network);
        assert_eq!(resolution.view.recipe, risotto());
        assert_eq!(resolution.view.slot, MealSlot::Dinner);
        assert_eq!(resolution.view.image_url, "https://images.example/Risotto.png");
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 1);

        let cached = cache.get(&RecipeKey::new("Risotto", MealSlot::Dinner)).await;
        assert_eq!(cached, Some(fake_detail("Risotto")));
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_cache() {
        let api = Arc::new(FakeApi::default());
        let (resolver, _) = resolver(Arc::clone(&api));

        let first = resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap();
        let second = resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.view, first.view);
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn same_meal_in_other_slot_is_a_separate_entry() {
        let api = Arc::new(FakeApi::default());
        let (resolver, _) = resolver(Arc::clone(&api));

        resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap();
        let lunch = resolver.resolve(&risotto(), MealSlot::Lunch).await.unwrap();
        assert_eq!(lunch.source, Source::Network);
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_fetch() {
        let api = Arc::new(FakeApi {
            delay: Some(Duration::from_millis(50)),
            ..FakeApi::default()
        });
        let (resolver, _) = resolver(Arc::clone(&api));
        let recipe = risotto();

        let (a, b, c) = tokio::join!(
            resolver.resolve(&recipe, MealSlot::Dinner),
            resolver.resolve(&recipe, MealSlot::Dinner),
            resolver.resolve(&recipe, MealSlot::Dinner),
        );
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 1);
        let a = a.unwrap();
        assert_eq!(a.view, b.unwrap().view);
        assert_eq!(a.view, c.unwrap().view);
        assert!(resolver.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failure_is_reported_and_not_cached() {
        let api = Arc::new(FakeApi {
            fail: true,
            ..FakeApi::default()
        });
        let (resolver, cache) = resolver(Arc::clone(&api));

        let err = resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap_err();
        assert!(err.to_string().contains("Internal Server Error"));
        assert_eq!(cache.get(&RecipeKey::new("Risotto", MealSlot::Dinner)).await, None);

        resolver.resolve(&risotto(), MealSlot::Dinner).await.unwrap_err();
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detail_state_transitions() {
        let key = RecipeKey::new("Risotto", MealSlot::Dinner);
        let loading = DetailState::start(key.clone());
        assert!(loading.is_loading());

        let view = RecipeView::new(risotto(), MealSlot::Dinner, fake_detail("Risotto"));
        let resolution = Resolution {
            view,
            source: Source::Network,
        };
        let resolved = loading.clone().complete(Ok(resolution.clone()));
        assert_eq!(resolved, DetailState::Resolved(resolution));

        let err = ResolveError::Fetch(Arc::new(ApiError::InvalidJson(
            serde_json::from_str::<u8>("x").unwrap_err(),
        )));
        match loading.complete(Err(err)) {
            DetailState::Failed { key: failed, message } => {
                assert_eq!(failed, key);
                assert!(message.starts_with("recipe details unavailable"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        assert_eq!(
            DetailState::Idle.complete(Err(ResolveError::Fetch(Arc::new(ApiError::InvalidJson(
                serde_json::from_str::<u8>("x").unwrap_err(),
            ))))),
            DetailState::Idle
        );
    }
}
