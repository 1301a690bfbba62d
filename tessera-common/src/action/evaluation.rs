use std::sync::Arc;

use super::{Action, ActionContext, UnexpectedlyTerminatedAction};
use crate::state::AccountStateDelta;

/// Outcome of attempting one action.
#[derive(Debug)]
pub struct ActionEvaluation {
    pub action: Arc<dyn Action>,
    /// The context as it was before execution, with an untouched random source.
    pub input_context: ActionContext,
    /// State after the action, or the unchanged input state if it failed.
    pub output_state: AccountStateDelta,
    pub exception: Option<UnexpectedlyTerminatedAction>,
}

impl ActionEvaluation {
    pub fn new(
        action: Arc<dyn Action>,
        input_context: ActionContext,
        output_state: AccountStateDelta,
        exception: Option<UnexpectedlyTerminatedAction>,
    ) -> Self {
        Self { action, input_context, output_state, exception }
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }
}
