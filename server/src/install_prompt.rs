//! Page-side install prompt state
//!
//! The page defers the browser's install prompt until the user clicks the
//! install button. All of that state lives in one controller that is
//! created on page load and cleared once an outcome is known. The proxy
//! keeps one per site and drives it from the `/__sw/` control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// A deferred install prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredPrompt {
    pub platforms: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl DeferredPrompt {
    pub fn new(platforms: Vec<String>) -> Self {
        Self {
            platforms,
            received_at: Utc::now(),
        }
    }
}

/// Snapshot of the controller for the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPromptStatus {
    pub button_visible: bool,
    pub deferred_platforms: Option<Vec<String>>,
    pub last_outcome: Option<InstallOutcome>,
    pub installed: bool,
}

#[derive(Debug, Default)]
pub struct InstallPromptController {
    deferred: Option<DeferredPrompt>,
    button_visible: bool,
    last_outcome: Option<InstallOutcome>,
    installed: bool,
}

impl InstallPromptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The browser offered an install prompt: keep it and show the button
    pub fn on_before_install_prompt(&mut self, prompt: DeferredPrompt) {
        info!("beforeinstallprompt received");
        self.deferred = Some(prompt);
        self.button_visible = true;
    }

    /// The install button was clicked
    ///
    /// `choose` shows the deferred prompt and reports the user's choice.
    /// Without a deferred prompt the click does nothing.
    pub fn on_click<F>(&mut self, choose: F) -> Option<InstallOutcome>
    where
        F: FnOnce(&DeferredPrompt) -> InstallOutcome,
    {
        let prompt = self.deferred.take()?;
        let outcome = choose(&prompt);
        info!("User response to install prompt: {:?}", outcome);

        self.last_outcome = Some(outcome);
        self.button_visible = false;
        Some(outcome)
    }

    pub fn on_app_installed(&mut self) {
        info!("App installed");
        self.deferred = None;
        self.button_visible = false;
        self.installed = true;
    }

    pub fn is_button_visible(&self) -> bool {
        self.button_visible
    }

    pub fn has_deferred_prompt(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn last_outcome(&self) -> Option<InstallOutcome> {
        self.last_outcome
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn status(&self) -> InstallPromptStatus {
        InstallPromptStatus {
            button_visible: self.button_visible,
            deferred_platforms: self.deferred.as_ref().map(|prompt| prompt.platforms.clone()),
            last_outcome: self.last_outcome,
            installed: self.installed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_without_prompt_does_nothing() {
        let mut controller = InstallPromptController::new();
        assert_eq!(controller.on_click(|_| InstallOutcome::Accepted), None);
        assert!(!controller.is_button_visible());
    }

    #[test]
    fn test_prompt_then_click_clears_state() {
        let mut controller = InstallPromptController::new();
        controller.on_before_install_prompt(DeferredPrompt::new(vec!["web".to_string()]));
        assert!(controller.is_button_visible());
        assert!(controller.has_deferred_prompt());

        let outcome = controller.on_click(|prompt| {
            assert_eq!(prompt.platforms, vec!["web"]);
            InstallOutcome::Dismissed
        });
        assert_eq!(outcome, Some(InstallOutcome::Dismissed));
        assert!(!controller.has_deferred_prompt());
        assert!(!controller.is_button_visible());
        assert_eq!(controller.last_outcome(), Some(InstallOutcome::Dismissed));

        // The prompt can only be used once
        assert_eq!(controller.on_click(|_| InstallOutcome::Accepted), None);
    }

    #[test]
    fn test_app_installed_hides_button() {
        let mut controller = InstallPromptController::new();
        controller.on_before_install_prompt(DeferredPrompt::new(Vec::new()));
        controller.on_app_installed();
        assert!(!controller.is_button_visible());
        assert!(!controller.has_deferred_prompt());
        assert!(controller.is_installed());
    }
}
