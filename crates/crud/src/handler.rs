//! Handlers: actions that answer an HTTP request.
//!
//! A [`Handler`] adds four steps around the [`Action`] lifecycle. [`serve`] runs them in the order
//!
//! ```text
//! auth_check → read_request → init_response → execute_action → write_response
//! ```
//!
//! Errors from the three steps before the action are returned as they are, without reaching
//! [`Action::done`]. An error from the action skips `write_response`.

use crate::action::{Action, execute_action};
use crate::error::BoxError;
use crate::request::RequestContext;
use crate::response::ResponseSink;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// An [`Action`] that reads its input from a request and writes its output to a response.
///
/// Every step has a no-op default.
#[async_trait]
pub trait Handler: Action {
    /// Checks whether the request is allowed to proceed.
    async fn auth_check(&mut self, _req: &RequestContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Reads the request into the handler.
    async fn read_request(&mut self, _req: &RequestContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Prepares the response before the action runs. Streaming writers capture the sink here.
    fn init_response(&mut self, _sink: &ResponseSink) -> Result<(), BoxError> {
        Ok(())
    }

    /// Writes the result of the action.
    async fn write_response(&mut self, _sink: &ResponseSink, _req: &RequestContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Produces a fresh [`Handler`] for every request.
pub trait HandlerInitializer: Send + Sync {
    fn init(&self) -> Box<dyn Handler>;
}

impl<T: HandlerInitializer + ?Sized> HandlerInitializer for Arc<T> {
    fn init(&self) -> Box<dyn Handler> {
        (**self).init()
    }
}

impl<T: HandlerInitializer + ?Sized> HandlerInitializer for Box<T> {
    fn init(&self) -> Box<dyn Handler> {
        (**self).init()
    }
}

/// A [`HandlerInitializer`] built from a function returning a new handler.
pub struct FnInitializer<F> {
    f: F,
}

impl<F> fmt::Debug for FnInitializer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInitializer").finish_non_exhaustive()
    }
}

pub fn init_fn<F, H>(f: F) -> FnInitializer<F>
where
    F: Fn() -> H + Send + Sync,
    H: Handler + 'static,
{
    FnInitializer { f }
}

impl<F, H> HandlerInitializer for FnInitializer<F>
where
    F: Fn() -> H + Send + Sync,
    H: Handler + 'static,
{
    fn init(&self) -> Box<dyn Handler> {
        Box::new((self.f)())
    }
}

/// Handles one request with a handler freshly produced by `initializer`.
pub async fn serve<I>(initializer: &I, req: &RequestContext, sink: &ResponseSink) -> Result<(), BoxError>
where
    I: HandlerInitializer + ?Sized,
{
    let mut handler = initializer.init();

    handler.auth_check(req).await?;
    handler.read_request(req).await?;
    handler.init_response(sink)?;

    execute_action(&mut *handler).await?;
    trace!(method = %req.method(), path = req.uri().path(), "action done, writing response");

    handler.write_response(sink, req).await
}

#[cfg(test)]
mod tests {
    use super::{Handler, HandlerInitializer, init_fn, serve};
    use crate::action::{Action, Flow, Step};
    use crate::error::BoxError;
    use crate::request::{PathParams, RequestContext};
    use crate::response::ResponseSink;
    use async_trait::async_trait;
    use http::{Request, StatusCode};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    #[derive(Clone, Default)]
    struct Plan {
        log: Log,
        fail_at: Option<&'static str>,
        done_suppresses: bool,
    }

    impl Plan {
        fn failing_at(step: &'static str) -> Self {
            Self { fail_at: Some(step), ..Self::default() }
        }

        fn record(&self, step: &'static str) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(step);
            if self.fail_at == Some(step) { Err(format!("{step} failed").into()) } else { Ok(()) }
        }

        fn steps(&self) -> Vec<&'static str> {
            self.log.lock().unwrap().clone()
        }
    }

    struct Probe(Plan);

    #[async_trait]
    impl Action for Probe {
        async fn validate(&mut self) -> Step {
            self.0.record("validate").map(|()| Flow::Continue)
        }

        async fn execute(&mut self) -> Step {
            self.0.record("execute").map(|()| Flow::Continue)
        }

        async fn done(&mut self, result: Result<(), BoxError>) -> Result<(), BoxError> {
            self.0.record("done")?;
            if self.0.done_suppresses { Ok(()) } else { result }
        }
    }

    #[async_trait]
    impl Handler for Probe {
        async fn auth_check(&mut self, _req: &RequestContext) -> Result<(), BoxError> {
            self.0.record("auth_check")
        }

        async fn read_request(&mut self, _req: &RequestContext) -> Result<(), BoxError> {
            self.0.record("read_request")
        }

        fn init_response(&mut self, _sink: &ResponseSink) -> Result<(), BoxError> {
            self.0.record("init_response")
        }

        async fn write_response(&mut self, sink: &ResponseSink, _req: &RequestContext) -> Result<(), BoxError> {
            self.0.record("write_response")?;
            sink.write_header(StatusCode::NO_CONTENT);
            Ok(())
        }
    }

    fn initializer(plan: &Plan) -> impl HandlerInitializer {
        let plan = plan.clone();
        init_fn(move || Probe(plan.clone()))
    }

    fn request() -> RequestContext {
        RequestContext::new(Request::new(String::new()), PathParams::empty())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn runs_all_steps_in_order() {
        let plan = Plan::default();
        let sink = ResponseSink::new();

        serve(&initializer(&plan), &request(), &sink).await.unwrap();

        assert_eq!(
            plan.steps(),
            ["auth_check", "read_request", "init_response", "validate", "execute", "done", "write_response"]
        );
        assert_eq!(sink.status(), Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn handler_errors_bypass_done() {
        for step in ["auth_check", "read_request", "init_response"] {
            let plan = Plan::failing_at(step);

            let err = serve(&initializer(&plan), &request(), &ResponseSink::new()).await.unwrap_err();

            assert_eq!(err.to_string(), format!("{step} failed"));
            assert_eq!(plan.steps().last(), Some(&step));
            assert!(!plan.steps().contains(&"done"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn action_error_skips_write_response() {
        let plan = Plan::failing_at("execute");
        let sink = ResponseSink::new();

        let err = serve(&initializer(&plan), &request(), &sink).await.unwrap_err();

        assert_eq!(err.to_string(), "execute failed");
        assert_eq!(plan.steps().last(), Some(&"done"));
        assert!(!sink.is_committed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn suppressed_action_error_still_writes() {
        let plan = Plan { done_suppresses: true, ..Plan::failing_at("validate") };
        let sink = ResponseSink::new();

        serve(&initializer(&plan), &request(), &sink).await.unwrap();

        assert_eq!(
            plan.steps(),
            ["auth_check", "read_request", "init_response", "validate", "done", "write_response"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn every_request_gets_a_fresh_handler() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);

        struct Noop;
        impl Action for Noop {}
        impl Handler for Noop {}

        let init = Arc::new(init_fn(move || {
            *counter.lock().unwrap() += 1;
            Noop
        }));

        serve(&init, &request(), &ResponseSink::new()).await.unwrap();
        serve(&init, &request(), &ResponseSink::new()).await.unwrap();

        assert_eq!(*count.lock().unwrap(), 2);
    }
}
