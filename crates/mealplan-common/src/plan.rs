/// Plan screen data: per-day recipe triples, nutrition summaries, the calendar week the
/// plan is displayed against, and the view state of the week grid.
use chrono::{Datelike, Days, Local, NaiveDate};
use schemars::JsonSchema;
use serde::Serialize;

use crate::model::{MealSlot, NutritionInfo, Recipe, RecipeKey, WeekPlan};
use crate::resolver::{DetailState, RecipeResolver, Resolution, ResolveError};

/// Day totals formatted for display: calories bare, sodium in `mg`, fat and protein in `g`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct NutritionSummary {
    pub calories: String,
    pub sodium: String,
    pub fat: String,
    pub protein: String,
}

impl NutritionSummary {
    /// Shown for a day the backend sent no nutrition for.
    pub fn zeroed() -> Self {
        Self {
            calories: "0".to_string(),
            sodium: "0".to_string(),
            fat: "0".to_string(),
            protein: "0".to_string(),
        }
    }
}

impl From<&NutritionInfo> for NutritionSummary {
    fn from(n: &NutritionInfo) -> Self {
        Self {
            calories: n.calories.to_string(),
            sodium: format!("{}mg", n.sodium),
            fat: format!("{}g", n.fat),
            protein: format!("{}g", n.protein),
        }
    }
}

/// Day name to `[breakfast, lunch, dinner]`, in plan order.
pub fn extract_recipe_data(plan: &WeekPlan) -> Vec<(String, [Recipe; 3])> {
    plan.days
        .iter()
        .map(|(day, meals)| {
            (
                day.clone(),
                [meals.breakfast.clone(), meals.lunch.clone(), meals.dinner.clone()],
            )
        })
        .collect()
}

/// Day name to display-ready nutrition, in plan order.
pub fn extract_nutrition_data(plan: &WeekPlan) -> Vec<(String, NutritionSummary)> {
    plan.days
        .iter()
        .map(|(day, meals)| {
            let summary = meals
                .nutrition
                .as_ref()
                .map(NutritionSummary::from)
                .unwrap_or_else(NutritionSummary::zeroed);
            (day.clone(), summary)
        })
        .collect()
}

/// The Sunday-to-Saturday week containing `reference`, or `None` when part of that
/// week falls outside the dates chrono can represent.
pub fn week_dates(reference: NaiveDate) -> Option<[NaiveDate; 7]> {
    let back = Days::new(u64::from(reference.weekday().num_days_from_sunday()));
    let sunday = reference.checked_sub_days(back)?;
    let days: Vec<NaiveDate> = sunday.iter_days().take(7).collect();
    days.try_into().ok()
}

pub fn current_week_dates() -> Option<[NaiveDate; 7]> {
    week_dates(Local::now().date_naive())
}

/// `"October 18"`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d").to_string()
}

pub fn plan_title(week: &[NaiveDate; 7]) -> String {
    format!(
        "Meal Plan for {} - {}",
        format_date(week[0]),
        format_date(week[6])
    )
}

/// One column of the week grid.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct DayCard {
    pub day: String,
    /// Date of the i-th week day for the i-th plan day; `None` past the seventh.
    pub date: Option<NaiveDate>,
    pub recipes: [Recipe; 3],
    pub nutrition: NutritionSummary,
}

/// The bottom panel of a day card: collapsed "More Info" tab, or one day's nutrition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, JsonSchema)]
#[serde(tag = "mode", content = "day", rename_all = "lowercase")]
pub enum NutritionPanel {
    #[default]
    Collapsed,
    Expanded(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("no such day in plan: {0}")]
    UnknownDay(String),

    #[error("no displayable week around {0}")]
    DateOutOfRange(NaiveDate),
}

pub struct PlanScreen {
    plan: WeekPlan,
    week: [NaiveDate; 7],
    cards: Vec<DayCard>,
    panel: NutritionPanel,
    detail: DetailState,
}

impl PlanScreen {
    pub fn new(plan: WeekPlan, today: NaiveDate) -> Result<Self, PlanError> {
        let week = week_dates(today).ok_or(PlanError::DateOutOfRange(today))?;
        let nutrition = extract_nutrition_data(&plan);
        let cards = extract_recipe_data(&plan)
            .into_iter()
            .zip(nutrition)
            .enumerate()
            .map(|(i, ((day, recipes), (_, nutrition)))| DayCard {
                day,
                date: week.get(i).copied(),
                recipes,
                nutrition,
            })
            .collect();
        Ok(Self {
            plan,
            week,
            cards,
            panel: NutritionPanel::Collapsed,
            detail: DetailState::Idle,
        })
    }

    pub fn plan(&self) -> &WeekPlan {
        &self.plan
    }

    pub fn week(&self) -> &[NaiveDate; 7] {
        &self.week
    }

    pub fn title(&self) -> String {
        plan_title(&self.week)
    }

    pub fn cards(&self) -> &[DayCard] {
        &self.cards
    }

    pub fn card(&self, day: &str) -> Option<&DayCard> {
        self.cards.iter().find(|c| c.day == day)
    }

    pub fn panel(&self) -> &NutritionPanel {
        &self.panel
    }

    pub fn expand_nutrition(&mut self, day: &str) -> Result<&NutritionSummary, PlanError> {
        let card = self
            .cards
            .iter()
            .find(|c| c.day == day)
            .ok_or_else(|| PlanError::UnknownDay(day.to_string()))?;
        self.panel = NutritionPanel::Expanded(card.day.clone());
        Ok(&card.nutrition)
    }

    pub fn collapse_nutrition(&mut self) {
        self.panel = NutritionPanel::Collapsed;
    }

    pub fn detail(&self) -> &DetailState {
        &self.detail
    }

    pub fn close_detail(&mut self) {
        self.detail = DetailState::Idle;
    }

    /// Move the detail view to `Loading` for one meal and return the recipe to resolve.
    pub fn begin_recipe(&mut self, day: &str, slot: MealSlot) -> Result<Recipe, PlanError> {
        let recipe = self
            .card(day)
            .map(|c| c.recipes[slot.index()].clone())
            .ok_or_else(|| PlanError::UnknownDay(day.to_string()))?;
        self.detail = DetailState::start(RecipeKey::new(&recipe.meal, slot));
        Ok(recipe)
    }

    /// Apply a resolution outcome. Ignored unless the view is still loading `key`, so a
    /// late answer for a recipe the user has since left never replaces the current view.
    pub fn finish_recipe(
        &mut self,
        key: &RecipeKey,
        outcome: Result<Resolution, ResolveError>,
    ) -> &DetailState {
        if matches!(&self.detail, DetailState::Loading { key: loading } if loading == key) {
            self.detail = std::mem::take(&mut self.detail).complete(outcome);
        }
        &self.detail
    }

    /// Open the detail view for one meal, resolving it through the cache or the backend.
    /// A failed fetch leaves the view in `Failed` with the reason.
    pub async fn open_recipe(
        &mut self,
        day: &str,
        slot: MealSlot,
        resolver: &RecipeResolver,
    ) -> Result<&DetailState, PlanError> {
        let recipe = self.begin_recipe(day, slot)?;
        let key = RecipeKey::new(&recipe.meal, slot);
        let outcome = resolver.resolve(&recipe, slot).await;
        Ok(self.finish_recipe(&key, outcome))
    }
}
