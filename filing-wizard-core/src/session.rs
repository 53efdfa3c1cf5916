//! Session context injected at construction

/// Who is filing, and which plan they picked on the landing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// `None` for a guest
    pub user_id: Option<String>,
    pub preselected_plan: Option<String>,
}

impl SessionContext {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            preselected_plan: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.preselected_plan = Some(plan.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}
