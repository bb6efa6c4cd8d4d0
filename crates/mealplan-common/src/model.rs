use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A generated week: day name to that day's meals, in the order the backend sent them.
///
/// Wire shape is `{ "plan": { "Monday": DayPlan, ... } }`. Day keys are not assumed to
/// be the seven weekdays and are never re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    #[serde(rename = "plan", with = "ordered_days")]
    pub days: Vec<(String, DayPlan)>,
}

impl WeekPlan {
    pub fn day(&self, name: &str) -> Option<&DayPlan> {
        self.days.iter().find(|(day, _)| day == name).map(|(_, plan)| plan)
    }

    pub fn day_names(&self) -> impl Iterator<Item = &str> {
        self.days.iter().map(|(day, _)| day.as_str())
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub breakfast: Recipe,
    pub lunch: Recipe,
    pub dinner: Recipe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
}

impl DayPlan {
    pub fn meal(&self, slot: MealSlot) -> &Recipe {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Recipe {
    /// Meal name; also the first half of the cache key.
    pub meal: String,
    pub description: String,
}

/// Daily totals. Sodium is in milligrams, fat and protein in grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NutritionInfo {
    pub calories: f64,
    pub sodium: f64,
    pub fat: f64,
    pub protein: f64,
}

/// Position of a meal within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];

    pub fn index(self) -> usize {
        match self {
            MealSlot::Breakfast => 0,
            MealSlot::Lunch => 1,
            MealSlot::Dinner => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Breakfast",
            MealSlot::Lunch => "Lunch",
            MealSlot::Dinner => "Dinner",
        }
    }
}

/// Cache identity of a recipe: `{meal}-{slot index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeKey(String);

impl RecipeKey {
    pub fn new(meal: &str, slot: MealSlot) -> Self {
        Self(format!("{meal}-{}", slot.index()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recipe body as returned by `/get_recipe`.
///
/// The backend sends `{ ingredients, steps }`; older payloads carried free text.
/// Anything else is kept verbatim so a cached entry never fails to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RecipeDetails {
    Structured {
        ingredients: Vec<String>,
        steps: Vec<String>,
    },
    Text(String),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CachedRecipeDetail {
    pub details: RecipeDetails,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekRequest {
    pub restrictions: Vec<String>,
    pub cuisine: String,
    pub calories: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRequest {
    pub meal: String,
    pub description: String,
}

impl From<&Recipe> for RecipeRequest {
    fn from(recipe: &Recipe) -> Self {
        Self {
            meal: recipe.meal.clone(),
            description: recipe.description.clone(),
        }
    }
}

/// Serde adapter for a JSON object whose key order must survive the round trip.
mod ordered_days {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::DayPlan;

    pub fn serialize<S>(days: &[(String, DayPlan)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(days.len()))?;
        for (day, plan) in days {
            map.serialize_entry(day, plan)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, DayPlan)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(DaysVisitor)
    }

    struct DaysVisitor;

    impl<'de> Visitor<'de> for DaysVisitor {
        type Value = Vec<(String, DayPlan)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of day name to day plan")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut days: Vec<(String, DayPlan)> = Vec::with_capacity(access.size_hint().unwrap_or(7));
            while let Some((day, plan)) = access.next_entry::<String, DayPlan>()? {
                // Later duplicates win, matching JSON object semantics.
                if let Some(existing) = days.iter_mut().find(|(d, _)| *d == day) {
                    existing.1 = plan;
                } else {
                    days.push((day, plan));
                }
            }
            Ok(days)
        }
    }
}
