/// Preference selection screen state and plan submission.
use schemars::JsonSchema;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{ApiError, MealPlanApi};
use crate::model::{WeekPlan, WeekRequest};

pub const CUISINES: [&str; 4] = ["Italian", "Chinese", "Indian", "Mexican"];
pub const PREFERENCES: [&str; 4] = ["Low Carb", "Filling", "Healthy", "Low Fat"];
pub const DEFAULT_CUISINE: &str = "Select Cuisine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Dropdown {
    #[default]
    Closed,
    Open,
}

/// When the form returns to its defaults after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Clear after a plan arrives; a failed request keeps what the user entered.
    #[default]
    OnSuccess,
    /// Clear after every submission, whatever the outcome.
    Always,
}

impl std::str::FromStr for ResetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-success" => Ok(ResetPolicy::OnSuccess),
            "always" => Ok(ResetPolicy::Always),
            other => Err(format!("unknown reset policy: {other} (expected on-success or always)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Selection {
    pub preferences: Vec<String>,
    pub cuisine: String,
    pub calories: String,
    pub dropdown: Dropdown,
    pub loading: bool,
}

#[derive(Debug, Clone)]
pub struct PreferenceCollector {
    preferences: Vec<String>,
    cuisine: String,
    calories: String,
    dropdown: Dropdown,
    loading: bool,
    reset_policy: ResetPolicy,
}

impl Default for PreferenceCollector {
    fn default() -> Self {
        Self::new(ResetPolicy::default())
    }
}

impl PreferenceCollector {
    pub fn new(reset_policy: ResetPolicy) -> Self {
        Self {
            preferences: Vec::new(),
            cuisine: DEFAULT_CUISINE.to_string(),
            calories: String::new(),
            dropdown: Dropdown::Closed,
            loading: false,
            reset_policy,
        }
    }

    /// Select the preference if it is not selected, otherwise deselect it.
    pub fn toggle_preference(&mut self, label: &str) {
        if let Some(pos) = self.preferences.iter().position(|p| p == label) {
            self.preferences.remove(pos);
        } else {
            self.preferences.push(label.to_string());
        }
    }

    pub fn toggle_dropdown(&mut self) {
        self.dropdown = match self.dropdown {
            Dropdown::Closed => Dropdown::Open,
            Dropdown::Open => Dropdown::Closed,
        };
    }

    pub fn select_cuisine(&mut self, cuisine: &str) {
        self.cuisine = cuisine.to_string();
        self.dropdown = Dropdown::Closed;
    }

    pub fn set_calories(&mut self, calories: &str) {
        self.calories = calories.to_string();
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }

    pub fn selection(&self) -> Selection {
        Selection {
            preferences: self.preferences.clone(),
            cuisine: self.cuisine.clone(),
            calories: self.calories.clone(),
            dropdown: self.dropdown,
            loading: self.loading,
        }
    }

    pub fn request(&self) -> WeekRequest {
        WeekRequest {
            restrictions: self.preferences.clone(),
            cuisine: self.cuisine.clone(),
            calories: self.calories.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.preferences.clear();
        self.cuisine = DEFAULT_CUISINE.to_string();
        self.calories.clear();
    }

    /// Mark the form as submitting and return the request to send. `None` while an
    /// earlier submission is still in flight.
    pub fn begin_submit(&mut self) -> Option<WeekRequest> {
        if self.loading {
            return None;
        }
        self.loading = true;
        Some(self.request())
    }

    /// Clear the loading flag and apply the reset policy to the outcome of `request`.
    pub fn finish_submit(&mut self, request: &WeekRequest, outcome: &Result<WeekPlan, ApiError>) {
        self.loading = false;
        match outcome {
            Ok(plan) => {
                info!(days = plan.len(), cuisine = %request.cuisine, "week plan generated");
                self.reset();
            }
            Err(e) => {
                warn!(error = %e, cuisine = %request.cuisine, "week plan request failed");
                if self.reset_policy == ResetPolicy::Always {
                    self.reset();
                }
            }
        }
    }

    /// Drop an in-flight submission without an outcome. Selections are kept.
    pub fn cancel_submit(&mut self) {
        if self.loading {
            warn!("week plan request abandoned");
            self.loading = false;
        }
    }

    /// Send the current selections to `/get_week`. Exactly one request is issued; the
    /// loading flag is cleared on return whatever the outcome.
    pub async fn submit(&mut self, api: &dyn MealPlanApi) -> Result<WeekPlan, ApiError> {
        let request = self.request();
        self.loading = true;
        let outcome = api.get_week(&request).await;
        self.finish_submit(&request, &outcome);
        outcome
    }
}
