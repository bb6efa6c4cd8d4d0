/// Plain-text views of the plan screen and recipe detail, returned alongside structured tool output.
use mealplan_common::model::{MealSlot, RecipeDetails};
use mealplan_common::plan::{DayCard, NutritionPanel, NutritionSummary, PlanScreen, format_date};
use mealplan_common::resolver::RecipeView;

pub fn render_week(screen: &PlanScreen) -> String {
    let mut out = format!("{}\n", screen.title());
    for card in screen.cards() {
        out.push('\n');
        out.push_str(&render_card(card, screen.panel()));
    }
    out
}

fn render_card(card: &DayCard, panel: &NutritionPanel) -> String {
    let mut out = match card.date {
        Some(date) => format!("{} ({})\n", card.day, format_date(date)),
        None => format!("{}\n", card.day),
    };
    // The expanded panel covers the meal list.
    if matches!(panel, NutritionPanel::Expanded(day) if *day == card.day) {
        for line in render_nutrition(&card.nutrition).lines() {
            out.push_str(&format!("  {line}\n"));
        }
        return out;
    }
    for (slot, recipe) in MealSlot::ALL.iter().zip(card.recipes.iter()) {
        out.push_str(&format!("  {}: {}\n", slot.label(), recipe.meal));
    }
    out.push_str("  [More Info]\n");
    out
}

pub fn render_nutrition(nutrition: &NutritionSummary) -> String {
    format!(
        "Nutritional Content\nCalories: {}\nSodium: {}\nFat: {}\nProtein: {}\n",
        nutrition.calories, nutrition.sodium, nutrition.fat, nutrition.protein
    )
}

pub fn render_recipe(view: &RecipeView) -> String {
    let mut out = format!("{} ({})\n{}\n", view.recipe.meal, view.slot.label(), view.recipe.description);
    if !view.image_url.is_empty() {
        out.push_str(&format!("Image: {}\n", view.image_url));
    }
    out.push('\n');
    match &view.details {
        RecipeDetails::Structured { ingredients, steps } => {
            out.push_str("Ingredients:\n");
            for ingredient in ingredients {
                out.push_str(&format!("- {ingredient}\n"));
            }
            out.push_str("\nSteps:\n");
            for step in steps {
                out.push_str(&format!("{step}\n"));
            }
        }
        RecipeDetails::Text(text) => out.push_str(&format!("{text}\n")),
        RecipeDetails::Other(value) => out.push_str(&format!("{value:#}\n")),
    }
    out
}
