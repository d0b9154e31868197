//! Connection handler contract.
//!
//! The pool knows nothing about what travels over a connection. Framing,
//! routing and serialization all live behind [`ConnectionHandler`].

use crate::platform::Connection;
use std::fmt;

/// Caller-supplied logic run once per accepted connection.
///
/// The handler borrows the connection; the pool keeps ownership so it can
/// disconnect and release the endpoint after `handle` returns, whatever the
/// outcome. Errors and panics are isolated to the connection and reported
/// through the pool's [`DiagnosticHook`](crate::diagnostics::DiagnosticHook).
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, connection: &mut Connection) -> anyhow::Result<()>;
}

/// Why a handler did not complete successfully.
#[derive(Debug)]
pub enum HandlerFailure {
    /// The handler returned an error.
    Error(anyhow::Error),
    /// The handler panicked; carries the panic message when it was a string.
    Panic(String),
}

impl HandlerFailure {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        HandlerFailure::Panic(message)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, HandlerFailure::Panic(_))
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Error(e) => write!(f, "handler error: {:#}", e),
            HandlerFailure::Panic(msg) => write!(f, "handler panicked: {}", msg),
        }
    }
}
