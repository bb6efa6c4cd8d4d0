use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::MealSlot;
use crate::plan::{DayCard, NutritionPanel, NutritionSummary};
use crate::preferences::Selection;
use crate::resolver::{RecipeView, Source};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdatePreferencesParams {
    /// Preference labels to toggle on or off, e.g. ["Low Carb", "Healthy"].
    pub toggle_preferences: Option<Vec<String>>,
    /// Cuisine to select, one of the cuisines reported by list_options.
    pub cuisine: Option<String>,
    /// Daily calorie target as typed, e.g. "2000". An empty string clears it.
    pub calories: Option<String>,
    /// Open or close the cuisine dropdown.
    pub toggle_dropdown: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DayParams {
    /// Day name exactly as it appears in the plan, e.g. "Monday".
    pub day: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OpenRecipeParams {
    /// Day name exactly as it appears in the plan.
    pub day: String,
    /// Which meal of the day: "breakfast", "lunch" or "dinner".
    pub slot: MealSlot,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WeekDatesParams {
    /// Reference date (YYYY-MM-DD). Defaults to today.
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct OptionsResponse {
    pub cuisines: Vec<String>,
    pub preferences: Vec<String>,
    pub selection: Selection,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SelectionResponse {
    pub selection: Selection,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PlanResponse {
    pub title: String,
    pub days: Vec<DayCard>,
    pub panel: NutritionPanel,
    /// Plain-text rendering of the week grid.
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct NutritionResponse {
    pub day: String,
    pub nutrition: NutritionSummary,
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RecipeResponse {
    pub recipe: RecipeView,
    pub source: Source,
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WeekDatesResponse {
    pub dates: Vec<NaiveDate>,
    pub title: String,
}
