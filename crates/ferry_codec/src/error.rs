use crate::shape::Shape;

// -----------------------------------------------------------------------------
// Error

/// The error type shared by the exchange protocol, the codec compiler, and
/// format adapters.
///
/// Every failure aborts the in-flight operation; partially decoded values are
/// left in an unspecified but safe state. The kind of a failure can be
/// inspected with [`Error::kind`] without matching on display strings.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input. `context` holds a short prefix of the remaining
    /// input at the point of failure, or is empty when the input ended.
    #[error("{}", syntax_message(.message, .context))]
    Syntax { message: String, context: String },

    /// A well-formed value of the wrong shape for the destination.
    #[error("cannot decode {found} into {}", mismatch_target(.expected, .field.as_deref()))]
    Mismatch {
        found: String,
        expected: String,
        field: Option<String>,
    },

    /// A numeric literal outside the range of the destination type.
    #[error("number {literal} overflows {target}")]
    Overflow {
        literal: String,
        target: &'static str,
    },

    /// The type has no representation in the exchange protocol.
    #[error("unsupported type: {name}")]
    UnsupportedType { name: String },

    /// A value of a supported type that the format cannot represent, such as
    /// a NaN or infinite float.
    #[error("unsupported value: {value}")]
    UnsupportedValue { value: String },

    /// Container nesting exceeded the recursion limit during encoding.
    #[error("encountered a cycle via nested containers")]
    Cycle,

    /// A map key of a shape the format cannot use as a key.
    #[error("unsupported map key of shape {found}")]
    MapKey { found: Shape },

    #[error("{0}")]
    Message(String),
}

fn syntax_message(message: &str, context: &str) -> String {
    if context.is_empty() {
        message.to_owned()
    } else {
        format!("{message}: {context}")
    }
}

fn mismatch_target(expected: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("struct field {field} of type {expected}"),
        None => format!("value of type {expected}"),
    }
}

/// A discriminant-only view of [`Error`] for kind-level assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Mismatch,
    Overflow,
    UnsupportedType,
    UnsupportedValue,
    Cycle,
    MapKey,
    Message,
}

impl Error {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } => ErrorKind::Syntax,
            Error::Mismatch { .. } => ErrorKind::Mismatch,
            Error::Overflow { .. } => ErrorKind::Overflow,
            Error::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Error::UnsupportedValue { .. } => ErrorKind::UnsupportedValue,
            Error::Cycle => ErrorKind::Cycle,
            Error::MapKey { .. } => ErrorKind::MapKey,
            Error::Message(_) => ErrorKind::Message,
        }
    }

    /// A syntax error with a short input prefix as context.
    pub fn syntax(message: impl Into<String>, context: impl Into<String>) -> Self {
        Error::Syntax {
            message: message.into(),
            context: context.into(),
        }
    }

    /// A shape mismatch, as produced by the default [`Visitor`] methods.
    ///
    /// [`Visitor`]: crate::Visitor
    pub fn mismatch(found: Shape, expected: impl Into<String>) -> Self {
        Error::Mismatch {
            found: found.name().to_owned(),
            expected: expected.into(),
            field: None,
        }
    }

    /// A shape mismatch with a free-form description of the source value,
    /// such as `number 1.5`.
    pub fn mismatch_value(found: impl Into<String>, expected: impl Into<String>) -> Self {
        Error::Mismatch {
            found: found.into(),
            expected: expected.into(),
            field: None,
        }
    }

    pub fn overflow(literal: impl Into<String>, target: &'static str) -> Self {
        Error::Overflow {
            literal: literal.into(),
            target,
        }
    }

    pub fn unsupported_type(name: impl Into<String>) -> Self {
        Error::UnsupportedType { name: name.into() }
    }

    pub fn unsupported_value(value: impl Into<String>) -> Self {
        Error::UnsupportedValue {
            value: value.into(),
        }
    }

    pub fn map_key(found: Shape) -> Self {
        Error::MapKey { found }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// Attaches the `Struct.field` path to a mismatch error bubbling out of
    /// a record field, leaving other errors untouched.
    pub(crate) fn for_field(self, record: &str, field: &str) -> Self {
        match self {
            Error::Mismatch {
                found,
                expected,
                field: None,
            } => Error::Mismatch {
                found,
                expected,
                field: Some(format!("{record}.{field}")),
            },
            other => other,
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mismatch() {
        let err = Error::mismatch(Shape::Str, "i64");
        assert_eq!(err.to_string(), "cannot decode string into value of type i64");
        assert_eq!(err.kind(), ErrorKind::Mismatch);

        let err = err.for_field("Point", "x");
        assert_eq!(
            err.to_string(),
            "cannot decode string into struct field Point.x of type i64"
        );
    }

    #[test]
    fn display_overflow() {
        let err = Error::overflow("300", "u8");
        assert_eq!(err.to_string(), "number 300 overflows u8");
        assert_eq!(err.kind(), ErrorKind::Overflow);
    }
}
