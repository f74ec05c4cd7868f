//! The action lifecycle: six ordered steps and a terminal `done`.
//!
//! An [`Action`] splits the work of accomplishing one objective into a fixed sequence of steps.
//! The step names suggest what each one should do, but that is not binding: it is up to the
//! implementor to decide which step does which part of the work.
//!
//! [`execute_action`] runs the steps in order. The first step that fails, or that asks to finish
//! early with [`Flow::Done`], stops the sequence and hands over to [`Action::done`], which is
//! invoked exactly once and decides the final result.

use crate::error::BoxError;
use async_trait::async_trait;

/// What the lifecycle should do after a step succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// run the next step
    Continue,
    /// skip the remaining steps and finish through [`Action::done`] without an error
    Done,
}

/// The result of a single lifecycle step.
pub type Step = Result<Flow, BoxError>;

/// A set of steps executed in sequence to accomplish the action's objective.
///
/// Every step has a no-op default, so implementors only write the steps they need.
#[async_trait]
pub trait Action: Send {
    /// Prepare for input validation.
    async fn before_validate(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// Validate the input.
    async fn validate(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// Post processing after the input has been validated.
    async fn after_validate(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// Prepare for the main task.
    async fn before_execute(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// Execute the main task.
    async fn execute(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// Post processing after the main task has been executed.
    async fn after_execute(&mut self) -> Step {
        Ok(Flow::Continue)
    }

    /// The last step, invoked whether or not one of the preceding steps failed.
    ///
    /// `result` holds the error of the step that failed, if any. The returned value becomes the
    /// result of [`execute_action`], so `done` may suppress, replace or pass the error through.
    /// The default passes it through.
    async fn done(&mut self, result: Result<(), BoxError>) -> Result<(), BoxError> {
        result
    }
}

/// Executes the action, returning whatever its [`Action::done`] returns.
pub async fn execute_action<A>(action: &mut A) -> Result<(), BoxError>
where
    A: Action + ?Sized,
{
    let result = run_steps(action).await;
    action.done(result).await
}

async fn run_steps<A>(action: &mut A) -> Result<(), BoxError>
where
    A: Action + ?Sized,
{
    macro_rules! step {
        ($step:ident) => {
            if action.$step().await? == Flow::Done {
                return Ok(());
            }
        };
    }

    step!(before_validate);
    step!(validate);
    step!(after_validate);
    step!(before_execute);
    step!(execute);
    step!(after_execute);
    Ok(())
}
