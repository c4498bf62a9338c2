//! Structured logging helpers.
//!
//! Every line logged through these macros carries a `context` field naming
//! the execution context (`background`, `popup`, `tab-3`, ...), so logs
//! from several buses in one process can be told apart.

/// Log with a `context` field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $context:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            context = %$context,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a bus message with the standard `context` and `topic` fields.
#[macro_export]
macro_rules! log_message {
    ($level:ident, $context:expr, $msg:expr, $topic:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            context = %$context,
            topic = %$topic,
            $($($field)*,)?
            $msg
        )
    };
}
