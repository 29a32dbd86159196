//! Pure state machine for the scripted EMR login.
//!
//! The browser reports navigation events; [`LoginFlow::on_navigation`] turns
//! them into the single action the bridge should take next.

use crate::error::CredentialFailure;

const LOGIN_PAGE_MARKER: &str = "oscar/index.jsp";
const LOCKED_MARKER: &str = "oscar/login.do";
const PROVIDER_MARKER: &str = "oscar/provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    AwaitingLoginPage,
    /// The form was submitted; the next page decides the outcome.
    AwaitingResult,
    LoggedIn,
    Failed(CredentialFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Ignore,
    InjectLoginForm,
    LoggedIn,
    Failed(CredentialFailure),
}

#[derive(Debug, Clone)]
pub struct LoginFlow {
    stage: LoginStage,
    last_completed: Option<String>,
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginFlow {
    pub fn new() -> Self {
        Self {
            stage: LoginStage::AwaitingLoginPage,
            last_completed: None,
        }
    }

    pub fn stage(&self) -> LoginStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, LoginStage::LoggedIn | LoginStage::Failed(_))
    }

    pub fn on_navigation(&mut self, url: &str, loading: bool) -> FlowAction {
        if loading {
            self.last_completed = None;
            return FlowAction::Ignore;
        }
        // Web views often report the same finished load twice.
        if self.last_completed.as_deref() == Some(url) {
            return FlowAction::Ignore;
        }
        self.last_completed = Some(url.to_string());
        if self.is_finished() {
            return FlowAction::Ignore;
        }

        if url.contains(LOCKED_MARKER) {
            return self.fail(CredentialFailure::AccountLocked);
        }
        if url.contains(LOGIN_PAGE_MARKER) {
            return match self.stage {
                LoginStage::AwaitingLoginPage => {
                    self.stage = LoginStage::AwaitingResult;
                    FlowAction::InjectLoginForm
                }
                _ => self.fail(CredentialFailure::LoginRejected),
            };
        }
        if url.contains(PROVIDER_MARKER) {
            self.stage = LoginStage::LoggedIn;
            return FlowAction::LoggedIn;
        }
        FlowAction::Ignore
    }

    fn fail(&mut self, failure: CredentialFailure) -> FlowAction {
        self.stage = LoginStage::Failed(failure);
        FlowAction::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "https://emr.example.com/oscar/index.jsp";
    const PROVIDER: &str = "https://emr.example.com/oscar/provider/providercontrol.jsp";

    #[test]
    fn injects_form_once_then_logs_in() {
        let mut flow = LoginFlow::new();
        assert_eq!(flow.on_navigation(LOGIN, true), FlowAction::Ignore);
        assert_eq!(flow.on_navigation(LOGIN, false), FlowAction::InjectLoginForm);
        assert_eq!(flow.on_navigation(PROVIDER, true), FlowAction::Ignore);
        assert_eq!(flow.on_navigation(PROVIDER, false), FlowAction::LoggedIn);
        assert_eq!(flow.stage(), LoginStage::LoggedIn);
    }

    #[test]
    fn duplicate_completed_event_is_ignored() {
        let mut flow = LoginFlow::new();
        assert_eq!(flow.on_navigation(LOGIN, false), FlowAction::InjectLoginForm);
        assert_eq!(flow.on_navigation(LOGIN, false), FlowAction::Ignore);
        assert_eq!(flow.stage(), LoginStage::AwaitingResult);
    }

    #[test]
    fn returning_to_login_page_after_reload_is_rejection() {
        let mut flow = LoginFlow::new();
        flow.on_navigation(LOGIN, false);
        flow.on_navigation(LOGIN, true);
        assert_eq!(
            flow.on_navigation(LOGIN, false),
            FlowAction::Failed(CredentialFailure::LoginRejected)
        );
        assert!(flow.is_finished());
    }

    #[test]
    fn login_do_means_locked_account() {
        let mut flow = LoginFlow::new();
        flow.on_navigation(LOGIN, false);
        assert_eq!(
            flow.on_navigation("https://emr.example.com/oscar/login.do", false),
            FlowAction::Failed(CredentialFailure::AccountLocked)
        );
    }

    #[test]
    fn events_after_finish_are_ignored() {
        let mut flow = LoginFlow::new();
        flow.on_navigation(PROVIDER, false);
        assert_eq!(flow.on_navigation(LOGIN, true), FlowAction::Ignore);
        assert_eq!(flow.on_navigation(LOGIN, false), FlowAction::Ignore);
        assert_eq!(flow.stage(), LoginStage::LoggedIn);
    }
}
