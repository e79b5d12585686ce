// ============================================================================
// spark-weave - Errors
// ============================================================================

use thiserror::Error;

/// Everything that can go wrong inside the runtime.
///
/// None of these are fatal: faults raised by scheduled work are logged at the
/// point of invocation and swallowed so sibling jobs still run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computation body or callable reported a failure.
    #[error("computation body failed: {message}")]
    Body { message: String },

    /// A computation body panicked; the panic was caught and contained.
    #[error("computation body panicked: {message}")]
    Panicked { message: String },

    /// A list directive did not have the `item in collection` shape.
    #[error("malformed list directive `{expression}`: expected `item in collection`")]
    MalformedDirective { expression: String },

    /// A path was expected to resolve to a callable.
    #[error("`{path}` does not resolve to a callable")]
    NotCallable { path: String },

    /// Jobs kept re-scheduling themselves past the configured tick limit.
    #[error("update depth exceeded: still pending after {ticks} ticks")]
    UpdateDepthExceeded { ticks: u32 },
}

impl ReactiveError {
    /// Convenience constructor for body failures
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body {
            message: message.into(),
        }
    }
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render() {
        assert_eq!(
            ReactiveError::body("boom").to_string(),
            "computation body failed: boom"
        );
        assert_eq!(
            ReactiveError::MalformedDirective {
                expression: "items".into()
            }
            .to_string(),
            "malformed list directive `items`: expected `item in collection`"
        );
    }
}
