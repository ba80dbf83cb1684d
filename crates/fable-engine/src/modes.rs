use fable_core::prompt::ContentPolicy;

use crate::error::EngineError;

/// Session-wide toggles: the censor flag and the active model. Owned by the
/// session loop and read fresh on every generation request.
#[derive(Clone, Debug)]
pub struct ModeState {
    censored: bool,
    active_model: String,
}

impl ModeState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            censored: true,
            active_model: model.into(),
        }
    }

    /// Flip the censor flag and return the new value.
    pub fn toggle_censor(&mut self) -> bool {
        self.censored = !self.censored;
        self.censored
    }

    pub fn censored(&self) -> bool {
        self.censored
    }

    pub fn policy(&self) -> ContentPolicy {
        ContentPolicy::from_censored(self.censored)
    }

    /// Switch the active model, validated against the backend's current
    /// model list.
    pub fn select_model(&mut self, model: &str, available: &[String]) -> Result<(), EngineError> {
        if !available.iter().any(|m| m == model) {
            return Err(EngineError::UnknownModel(model.to_string()));
        }
        self.active_model = model.to_string();
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        &self.active_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn censoring_starts_on_and_toggles() {
        let mut modes = ModeState::new("qwen3-vl:4b");
        assert!(modes.censored());
        assert_eq!(modes.policy(), ContentPolicy::Restricted);
        assert!(!modes.toggle_censor());
        assert_eq!(modes.policy(), ContentPolicy::Open);
        assert!(modes.toggle_censor());
    }

    #[test]
    fn select_model_validates_against_available() {
        let mut modes = ModeState::new("qwen3-vl:4b");
        let available = vec!["qwen3-vl:4b".to_string(), "org/other".to_string()];

        modes.select_model("org/other", &available).unwrap();
        assert_eq!(modes.active_model(), "org/other");

        let err = modes.select_model("ghost:7b", &available).unwrap_err();
        assert!(matches!(err, EngineError::UnknownModel(_)));
        // Rejected selection leaves the active model untouched.
        assert_eq!(modes.active_model(), "org/other");
    }
}
