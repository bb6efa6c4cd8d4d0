/// MCP server for the meal planner.
///
/// Tools follow the two screens:
/// - `list_options`, `update_preferences`, `generate_plan`: the preference screen
/// - `show_plan`, `show_nutrition`, `open_recipe`: the plan screen
/// - `week_dates`: the calendar week a plan is displayed against
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate};
use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tokio::sync::RwLock;
use tracing::info;

use mealplan_common::api::{ApiError, MealPlanApi};
use mealplan_common::mcp_api::{
    DayParams, NutritionResponse, OpenRecipeParams, OptionsResponse, PlanResponse,
    RecipeResponse, SelectionResponse, UpdatePreferencesParams, WeekDatesParams,
    WeekDatesResponse,
};
use mealplan_common::model::{RecipeKey, WeekPlan, WeekRequest};
use mealplan_common::plan::{PlanScreen, plan_title, week_dates};
use mealplan_common::preferences::{CUISINES, PREFERENCES, PreferenceCollector, ResetPolicy};
use mealplan_common::resolver::RecipeResolver;

use crate::render::{render_nutrition, render_recipe, render_week};

const NO_PLAN: &str = "no plan yet: call generate_plan first";

#[derive(Clone)]
pub struct MealPlanServer {
    api: Arc<dyn MealPlanApi>,
    resolver: Arc<RecipeResolver>,
    collector: Arc<Mutex<PreferenceCollector>>,
    screen: Arc<RwLock<Option<PlanScreen>>>,
    tool_router: ToolRouter<MealPlanServer>,
}

impl MealPlanServer {
    pub fn new(
        api: Arc<dyn MealPlanApi>,
        resolver: Arc<RecipeResolver>,
        reset_policy: ResetPolicy,
    ) -> Self {
        Self {
            api,
            resolver,
            collector: Arc::new(Mutex::new(PreferenceCollector::new(reset_policy))),
            screen: Arc::new(RwLock::new(None)),
            tool_router: Self::tool_router(),
        }
    }
}

fn lock(collector: &Mutex<PreferenceCollector>) -> MutexGuard<'_, PreferenceCollector> {
    collector.lock().unwrap_or_else(|e| e.into_inner())
}

/// An in-flight `/get_week` call. The collector is only locked to start and finish it,
/// so the selection stays readable meanwhile. Dropping it unfinished clears `loading`.
struct Submission<'a> {
    collector: &'a Mutex<PreferenceCollector>,
    request: WeekRequest,
    finished: bool,
}

impl<'a> Submission<'a> {
    fn begin(collector: &'a Mutex<PreferenceCollector>) -> Option<Self> {
        let request = lock(collector).begin_submit()?;
        Some(Self {
            collector,
            request,
            finished: false,
        })
    }

    fn finish(mut self, outcome: &Result<WeekPlan, ApiError>) -> ResetPolicy {
        self.finished = true;
        let mut collector = lock(self.collector);
        collector.finish_submit(&self.request, outcome);
        collector.reset_policy()
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.collector).cancel_submit();
        }
    }
}

fn plan_response(screen: &PlanScreen) -> PlanResponse {
    PlanResponse {
        title: screen.title(),
        days: screen.cards().to_vec(),
        panel: screen.panel().clone(),
        rendered: render_week(screen),
    }
}

fn validate_calories(calories: &str) -> Result<(), String> {
    let trimmed = calories.trim();
    if trimmed.is_empty() || trimmed.parse::<u32>().is_ok() {
        Ok(())
    } else {
        Err(format!("calories must be a whole number, got {calories:?}"))
    }
}

#[tool_router]
impl MealPlanServer {
    #[tool(description = "List the cuisines and dietary preferences that can be selected, with the current selection.")]
    async fn list_options(&self) -> Result<Json<OptionsResponse>, String> {
        let selection = lock(&self.collector).selection();
        Ok(Json(OptionsResponse {
            cuisines: CUISINES.iter().map(|c| c.to_string()).collect(),
            preferences: PREFERENCES.iter().map(|p| p.to_string()).collect(),
            selection,
        }))
    }

    #[tool(description = "Edit the plan preferences: toggle dietary preferences, pick a cuisine, set the calorie target, or open/close the cuisine dropdown.")]
    async fn update_preferences(
        &self,
        Parameters(params): Parameters<UpdatePreferencesParams>,
    ) -> Result<Json<SelectionResponse>, String> {
        let toggles = params.toggle_preferences.unwrap_or_default();
        if let Some(unknown) = toggles.iter().find(|p| !PREFERENCES.contains(&p.as_str())) {
            return Err(format!("unknown preference: {unknown}"));
        }
        if let Some(cuisine) = &params.cuisine {
            if !CUISINES.contains(&cuisine.as_str()) {
                return Err(format!("unknown cuisine: {cuisine}"));
            }
        }
        if let Some(calories) = &params.calories {
            validate_calories(calories)?;
        }

        let mut collector = lock(&self.collector);
        if params.toggle_dropdown.unwrap_or(false) {
            collector.toggle_dropdown();
        }
        if let Some(cuisine) = &params.cuisine {
            collector.select_cuisine(cuisine);
        }
        if let Some(calories) = &params.calories {
            collector.set_calories(calories.trim());
        }
        for label in &toggles {
            collector.toggle_preference(label);
        }
        Ok(Json(SelectionResponse {
            selection: collector.selection(),
        }))
    }

    #[tool(description = "Generate a weekly meal plan from the current preferences (POST /get_week). Returns the week grid. Slow: the backend generates each day in turn.")]
    async fn generate_plan(&self) -> Result<Json<PlanResponse>, String> {
        let submission = Submission::begin(&self.collector)
            .ok_or_else(|| "a plan is already being generated".to_string())?;
        let outcome = self.api.get_week(&submission.request).await;
        let policy = submission.finish(&outcome);
        let plan = outcome.map_err(|e| match policy {
            ResetPolicy::OnSuccess => format!("plan generation failed: {e} (selections kept)"),
            ResetPolicy::Always => format!("plan generation failed: {e}"),
        })?;

        let screen = PlanScreen::new(plan, Local::now().date_naive()).map_err(|e| e.to_string())?;
        info!(days = screen.cards().len(), title = %screen.title(), "plan ready");
        let response = plan_response(&screen);
        *self.screen.write().await = Some(screen);
        Ok(Json(response))
    }

    #[tool(description = "Show the current week grid: each day's date, breakfast, lunch and dinner.")]
    async fn show_plan(&self) -> Result<Json<PlanResponse>, String> {
        let mut guard = self.screen.write().await;
        let screen = guard.as_mut().ok_or_else(|| NO_PLAN.to_string())?;
        screen.collapse_nutrition();
        screen.close_detail();
        Ok(Json(plan_response(screen)))
    }

    #[tool(description = "Expand the nutrition panel for one day of the plan (calories, sodium, fat, protein).")]
    async fn show_nutrition(
        &self,
        Parameters(params): Parameters<DayParams>,
    ) -> Result<Json<NutritionResponse>, String> {
        let mut guard = self.screen.write().await;
        let screen = guard.as_mut().ok_or_else(|| NO_PLAN.to_string())?;
        let nutrition = screen
            .expand_nutrition(params.day.trim())
            .map_err(|e| e.to_string())?
            .clone();
        Ok(Json(NutritionResponse {
            day: params.day.trim().to_string(),
            rendered: render_nutrition(&nutrition),
            nutrition,
        }))
    }

    #[tool(description = "Open the full recipe for one meal of the plan (ingredients, steps, image). Served from the recipe cache when it was opened before, otherwise fetched via POST /get_recipe.")]
    async fn open_recipe(
        &self,
        Parameters(params): Parameters<OpenRecipeParams>,
    ) -> Result<Json<RecipeResponse>, String> {
        let day = params.day.trim().to_string();
        let recipe = {
            let mut guard = self.screen.write().await;
            let screen = guard.as_mut().ok_or_else(|| NO_PLAN.to_string())?;
            screen
                .begin_recipe(&day, params.slot)
                .map_err(|e| e.to_string())?
        };
        let key = RecipeKey::new(&recipe.meal, params.slot);

        // Screen lock is released for the fetch.
        let outcome = self.resolver.resolve(&recipe, params.slot).await;
        if let Some(screen) = self.screen.write().await.as_mut() {
            screen.finish_recipe(&key, outcome.clone());
        }

        let resolution = outcome.map_err(|e| e.to_string())?;
        Ok(Json(RecipeResponse {
            rendered: render_recipe(&resolution.view),
            recipe: resolution.view,
            source: resolution.source,
        }))
    }

    #[tool(description = "The Sunday-to-Saturday week containing a date (default: today), as shown in the plan title.")]
    async fn week_dates(
        &self,
        Parameters(params): Parameters<WeekDatesParams>,
    ) -> Result<Json<WeekDatesResponse>, String> {
        let reference = match params.date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| format!("invalid date {raw:?}: {e}"))?,
            _ => Local::now().date_naive(),
        };
        let week = week_dates(reference)
            .ok_or_else(|| format!("no displayable week around {reference}"))?;
        Ok(Json(WeekDatesResponse {
            dates: week.to_vec(),
            title: plan_title(&week),
        }))
    }
}

#[tool_handler]
impl ServerHandler for MealPlanServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mealplan-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Weekly meal planner. Use list_options and update_preferences to choose a \
cuisine, calorie target and dietary preferences, then generate_plan. Browse the result with \
show_plan and show_nutrition, and open_recipe for a meal's ingredients and steps."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use mealplan_common::api::{ApiError, StatusCode};
    use mealplan_common::model::{
        CachedRecipeDetail, DayPlan, MealSlot, Recipe, RecipeDetails, RecipeRequest, WeekPlan,
        WeekRequest,
    };
    use mealplan_common::recipe_cache::RecipeCache;
    use mealplan_common::resolver::Source;
    use mealplan_common::store::MemoryStore;

    use super::*;

    #[derive(Default)]
    struct StubApi {
        week_requests: std::sync::Mutex<Vec<WeekRequest>>,
        recipe_calls: AtomicUsize,
        fail_week: bool,
        week_delay: Option<Duration>,
    }

    fn recipe(meal: &str) -> Recipe {
        Recipe {
            meal: meal.to_string(),
            description: format!("A plate of {meal}"),
        }
    }

    #[async_trait]
    impl MealPlanApi for StubApi {
        async fn get_week(&self, request: &WeekRequest) -> Result<WeekPlan, ApiError> {
            self.week_requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.week_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_week {
                return Err(ApiError::Upstream {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal Server Error".to_string(),
                });
            }
            Ok(WeekPlan {
                days: vec![(
                    "Monday".to_string(),
                    DayPlan {
                        breakfast: recipe("Cornetto"),
                        lunch: recipe("Caprese Salad"),
                        dinner: recipe("Risotto"),
                        nutrition: None,
                    },
                )],
            })
        }

        async fn get_recipe(&self, request: &RecipeRequest) -> Result<CachedRecipeDetail, ApiError> {
            self.recipe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(CachedRecipeDetail {
                details: RecipeDetails::Text(format!("Cook {}.", request.meal)),
                image_url: String::new(),
            })
        }
    }

    fn server(api: Arc<StubApi>, policy: ResetPolicy) -> MealPlanServer {
        let cache = Arc::new(RecipeCache::new(Arc::new(MemoryStore::new())));
        let resolver = Arc::new(RecipeResolver::new(api.clone(), cache));
        MealPlanServer::new(api, resolver, policy)
    }

    fn preferences(
        toggle: &[&str],
        cuisine: Option<&str>,
        calories: Option<&str>,
    ) -> Parameters<UpdatePreferencesParams> {
        Parameters(UpdatePreferencesParams {
            toggle_preferences: Some(toggle.iter().map(|s| s.to_string()).collect()),
            cuisine: cuisine.map(str::to_string),
            calories: calories.map(str::to_string),
            toggle_dropdown: None,
        })
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = MealPlanServer::tool_router().list_all();
        for name in [
            "list_options",
            "update_preferences",
            "generate_plan",
            "show_plan",
            "show_nutrition",
            "open_recipe",
            "week_dates",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[test]
    fn calorie_validation() {
        assert!(validate_calories("").is_ok());
        assert!(validate_calories(" 2000 ").is_ok());
        assert!(validate_calories("lots").is_err());
        assert!(validate_calories("-5").is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_labels() {
        let server = server(Arc::new(StubApi::default()), ResetPolicy::OnSuccess);
        assert!(server
            .update_preferences(preferences(&["Keto"], None, None))
            .await
            .is_err());
        assert!(server
            .update_preferences(preferences(&[], Some("French"), None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn generate_then_browse_plan() {
        let api = Arc::new(StubApi::default());
        let server = server(api.clone(), ResetPolicy::OnSuccess);

        assert!(server.show_plan().await.is_err());

        let Json(selection) = server
            .update_preferences(preferences(&["Low Carb"], Some("Italian"), Some("2000")))
            .await
            .unwrap();
        assert_eq!(selection.selection.cuisine, "Italian");

        let Json(plan) = server.generate_plan().await.unwrap();
        assert_eq!(plan.days.len(), 1);
        assert!(plan.rendered.contains("Breakfast: Cornetto"));
        assert_eq!(
            api.week_requests.lock().unwrap().clone(),
            vec![WeekRequest {
                restrictions: vec!["Low Carb".to_string()],
                cuisine: "Italian".to_string(),
                calories: "2000".to_string(),
            }]
        );

        let Json(options) = server.list_options().await.unwrap();
        assert_eq!(options.selection.cuisine, "Select Cuisine");
        assert!(options.selection.preferences.is_empty());

        let Json(nutrition) = server
            .show_nutrition(Parameters(DayParams {
                day: "Monday".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(nutrition.nutrition.calories, "0");

        let open = || {
            server.open_recipe(Parameters(OpenRecipeParams {
                day: "Monday".to_string(),
                slot: MealSlot::Dinner,
            }))
        };
        let Json(first) = open().await.unwrap();
        assert_eq!(first.source, Source::Network);
        assert!(first.rendered.contains("Cook Risotto."));
        let Json(second) = open().await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(api.recipe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_generation_keeps_selections() {
        let api = Arc::new(StubApi {
            fail_week: true,
            ..StubApi::default()
        });
        let server = server(api, ResetPolicy::OnSuccess);
        server
            .update_preferences(preferences(&["Healthy"], Some("Indian"), Some("1800")))
            .await
            .unwrap();

        match server.generate_plan().await {
            Err(e) => assert!(e.contains("selections kept"), "{e}"),
            Ok(_) => panic!("generation should fail"),
        }

        let Json(options) = server.list_options().await.unwrap();
        assert_eq!(options.selection.cuisine, "Indian");
        assert_eq!(options.selection.preferences, vec!["Healthy"]);
        assert!(!options.selection.loading);
    }

    #[tokio::test]
    async fn selection_stays_readable_while_plan_generates() {
        let api = Arc::new(StubApi {
            week_delay: Some(Duration::from_millis(300)),
            ..StubApi::default()
        });
        let server = server(api.clone(), ResetPolicy::OnSuccess);
        server
            .update_preferences(preferences(&["Filling"], Some("Mexican"), None))
            .await
            .unwrap();

        let generating = tokio::spawn({
            let server = server.clone();
            async move { server.generate_plan().await.is_ok() }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let Json(options) = tokio::time::timeout(Duration::from_millis(100), server.list_options())
            .await
            .expect("list_options blocked by generation")
            .unwrap();
        assert!(options.selection.loading);
        assert_eq!(options.selection.cuisine, "Mexican");

        match server.generate_plan().await {
            Err(e) => assert!(e.contains("already being generated"), "{e}"),
            Ok(_) => panic!("second generation should be rejected"),
        }

        assert!(generating.await.unwrap());
        assert_eq!(api.week_requests.lock().unwrap().len(), 1);
        let Json(options) = server.list_options().await.unwrap();
        assert!(!options.selection.loading);
        assert_eq!(options.selection.cuisine, "Select Cuisine");
    }

    #[tokio::test]
    async fn abandoned_generation_clears_loading() {
        let api = Arc::new(StubApi {
            week_delay: Some(Duration::from_secs(5)),
            ..StubApi::default()
        });
        let server = server(api, ResetPolicy::OnSuccess);
        server
            .update_preferences(preferences(&["Healthy"], None, None))
            .await
            .unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), server.generate_plan()).await;
        assert!(abandoned.is_err());

        let Json(options) = server.list_options().await.unwrap();
        assert!(!options.selection.loading);
        assert_eq!(options.selection.preferences, vec!["Healthy"]);
    }

    #[tokio::test]
    async fn week_dates_for_given_day() {
        let server = server(Arc::new(StubApi::default()), ResetPolicy::OnSuccess);
        let Json(week) = server
            .week_dates(Parameters(WeekDatesParams {
                date: Some("2026-10-21".to_string()),
            }))
            .await
            .unwrap();
        assert_eq!(week.dates.len(), 7);
        assert_eq!(week.dates[0], NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(week.title, "Meal Plan for October 18 - October 24");

        assert!(server
            .week_dates(Parameters(WeekDatesParams {
                date: Some("21/10/2026".to_string()),
            }))
            .await
            .is_err());
    }
}
