//! Error taxonomy shared by the transform and load stages.
//!
//! Failures split into two disjoint families: defects in the declarative
//! mapping ([`MappingError`]) and defects in a single input record
//! ([`TransformError`], [`ValueError`]). [`ObjectError`] carries that split to
//! callers so they can treat the former as fatal and the latter as skippable.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::SettingsError;

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for pipeline entry points.
#[derive(Debug, Error)]
pub enum Error {
    /// The declarative mapping is missing, malformed or inconsistent.
    #[error(transparent)]
    Mapping(#[from] MappingError),
    /// A STIX object could not be converted.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// The STIX source could not be decoded.
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    /// The backing store rejected a statement or batch.
    #[error(transparent)]
    Loading(#[from] LoadingError),
    /// A graph object could not be rendered.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// Settings file could not be read.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ObjectError> for Error {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::Config(err) => Error::Mapping(err),
            ObjectError::Data(err) => Error::Transform(err),
        }
    }
}

/// Defect in the mapping documents or a lookup they cannot answer.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A mapping document could not be read from disk.
    #[error("[Invalid mapping] failed to read {path}: {source}")]
    Read {
        /// Path of the document.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A mapping document is not valid JSON or has the wrong shape.
    #[error("[Invalid mapping] failed to decode {document}: {source}")]
    Decode {
        /// Name of the document.
        document: String,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// Documents decoded but disagree with each other.
    #[error("[Invalid mapping] {document}: {reason}")]
    Inconsistent {
        /// Name of the document holding the offending entry.
        document: &'static str,
        /// What is wrong.
        reason: String,
    },
    /// A value-type tag is not part of the vocabulary.
    #[error("[Invalid mapping] unknown value type '{tag}'")]
    UnknownValueType {
        /// The tag as written in the mapping.
        tag: String,
    },
    /// A lookup asked for a key the mapping does not define.
    #[error("[Invalid mapping] {0}")]
    Missing(String),
    /// The object needs a property to pick its subtype but lacks it.
    #[error("[Invalid mapping] the property '{property}' is required for STIX objects of type '{stix_type}'")]
    SubtypePropertyMissing {
        /// STIX type of the object.
        stix_type: String,
        /// Property keying the subtype table.
        property: String,
    },
    /// The subtype table has neither the value nor a default.
    #[error("[Invalid mapping] in '{stix_id}': the value '{value}' is not defined for '{property}' in the mapping of '{stix_type}'")]
    SubtypeUndefined {
        /// Identifier of the object.
        stix_id: String,
        /// STIX type of the object.
        stix_type: String,
        /// Property keying the subtype table.
        property: String,
        /// Lower-cased value found on the object.
        value: String,
    },
    /// More than one predefined extension is present on one object.
    #[error("[Invalid mapping] two predefined extensions given for '{stix_id}' ({first}, {second}); a '{stix_type}' must have at most one extension")]
    ExtensionConflict {
        /// Identifier of the object.
        stix_id: String,
        /// STIX type of the object.
        stix_type: String,
        /// First predefined extension found.
        first: String,
        /// Second predefined extension found.
        second: String,
    },
    /// A key-value property used a key outside the lookup table.
    #[error("[Invalid mapping] custom keys such as '{key}' are not supported in the STIX key-value type '{pair_type}'; valid keys: [{}]", .valid.join(", "))]
    UnsupportedKey {
        /// Key-value schema name.
        pair_type: String,
        /// Key found on the object.
        key: String,
        /// Keys the schema accepts, sorted.
        valid: Vec<String>,
    },
}

/// A raw value cannot be represented by the declared value type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    /// Builds a value error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        ValueError(message.into())
    }
}

/// Failure while converting one property value.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The mapping could not answer a lookup the value needed.
    #[error(transparent)]
    Mapping(#[from] MappingError),
    /// The value does not fit its declared type.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Coded sub-kind of a [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// `id` or `type` missing from the object.
    MissingRequiredProperty,
    /// A property that must carry a value is empty.
    UnspecifiedProperty,
    /// The object's type has no target type in the mapping.
    UnsupportedCustomType,
    /// A property holds a value of the right shape but invalid content.
    InvalidPropertyValue,
    /// A property holds a value of the wrong shape.
    InvalidPropertyType,
    /// Anything else.
    Other,
}

impl TransformErrorKind {
    /// Numeric code reported alongside the error.
    pub fn code(self) -> u16 {
        match self {
            TransformErrorKind::MissingRequiredProperty => 201,
            TransformErrorKind::UnspecifiedProperty => 202,
            TransformErrorKind::UnsupportedCustomType => 203,
            TransformErrorKind::InvalidPropertyValue => 204,
            TransformErrorKind::InvalidPropertyType => 205,
            TransformErrorKind::Other => 206,
        }
    }

    fn description(self) -> &'static str {
        match self {
            TransformErrorKind::MissingRequiredProperty => "Missing required property",
            TransformErrorKind::UnspecifiedProperty => "Unspecified property",
            TransformErrorKind::UnsupportedCustomType => "Unsupported custom type",
            TransformErrorKind::InvalidPropertyValue => "Invalid property value",
            TransformErrorKind::InvalidPropertyType => "Invalid property type",
            TransformErrorKind::Other => "Transformation failed",
        }
    }
}

/// Malformed or incomplete input object relative to the mapping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "[TransformationError {}] {}{}{}",
    .kind.code(),
    .kind.description(),
    suffix(": ", .detail),
    origin(.stix_id)
)]
pub struct TransformError {
    kind: TransformErrorKind,
    detail: Option<String>,
    stix_id: Option<String>,
}

impl TransformError {
    /// Creates an error of the given kind.
    pub fn new(kind: TransformErrorKind) -> Self {
        Self {
            kind,
            detail: None,
            stix_id: None,
        }
    }

    /// Attaches the offending property or a short explanation.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the identifier of the object being converted.
    pub fn with_stix_id(mut self, stix_id: impl Into<String>) -> Self {
        self.stix_id = Some(stix_id.into());
        self
    }

    /// Sub-kind of this error.
    pub fn kind(&self) -> TransformErrorKind {
        self.kind
    }

    /// Numeric code of the sub-kind.
    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Identifier of the object, when known.
    pub fn stix_id(&self) -> Option<&str> {
        self.stix_id.as_deref()
    }
}

fn suffix(separator: &str, detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|detail| format!("{separator}{detail}"))
        .unwrap_or_default()
}

fn origin(stix_id: &Option<String>) -> String {
    stix_id
        .as_ref()
        .map(|stix_id| format!(" (in '{stix_id}')"))
        .unwrap_or_default()
}

/// Failure converting a whole STIX object.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// Configuration defect; every object of this shape will fail the same way.
    #[error(transparent)]
    Config(#[from] MappingError),
    /// Defect in this input record only.
    #[error(transparent)]
    Data(#[from] TransformError),
}

impl ObjectError {
    /// Returns `true` when the failure comes from the mapping.
    pub fn is_config(&self) -> bool {
        matches!(self, ObjectError::Config(_))
    }

    /// Wraps a property-level failure, tagging data defects with the object id.
    pub(crate) fn from_convert(err: ConvertError, property: &str, stix_id: &str) -> Self {
        match err {
            ConvertError::Mapping(err) => ObjectError::Config(err),
            ConvertError::Value(err) => ObjectError::Data(
                TransformError::new(TransformErrorKind::InvalidPropertyValue)
                    .with_detail(format!("{property}: {err}"))
                    .with_stix_id(stix_id),
            ),
        }
    }
}

/// A graph object cannot be rendered as TypeQL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// Relations need at least one role player.
    #[error("relation ${variable} of type '{type_name}' must have at least one role")]
    RelationWithoutRoles {
        /// Scratch variable of the relation.
        variable: String,
        /// Target type of the relation.
        type_name: String,
    },
}

/// The STIX source could not be decoded.
#[derive(Debug, Error)]
pub enum ParsingError {
    /// The source file could not be read.
    #[error("[ParsingError] failed to read {path}: {source}")]
    Read {
        /// Path of the source.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The source is not valid JSON.
    #[error("[ParsingError] invalid JSON in {datasource}: {source}")]
    Json {
        /// Name of the source.
        datasource: String,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// The document is neither a bundle nor a list of objects.
    #[error("[ParsingError] {datasource} is not a STIX bundle")]
    NotABundle {
        /// Name of the source.
        datasource: String,
    },
    /// One entry of the bundle is unusable.
    #[error("[ParsingError] object #{index} in {datasource}: {reason}")]
    InvalidObject {
        /// Name of the source.
        datasource: String,
        /// Position inside the `objects` array.
        index: usize,
        /// What is wrong.
        reason: String,
    },
}

/// Backend diagnostic code rewritten into a clearer message.
const INVALID_REFERENCE_TYPE: &str = "[THW08]";

/// The backing store rejected a statement or a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "{} due to a TypeDB insertion error.\n{message}\nFailed query:\n{statement}",
    batch_label(.batch_size)
)]
pub struct LoadingError {
    message: String,
    statement: String,
    batch_size: usize,
}

impl LoadingError {
    /// Builds a loading error from a backend diagnostic.
    ///
    /// `statement` is the statement the backend was executing when it failed
    /// and `batch_size` the number of statements in the failing transaction.
    pub fn new(
        diagnostic: impl Into<String>,
        statement: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        let diagnostic = diagnostic.into();
        let message = if diagnostic.contains(INVALID_REFERENCE_TYPE) {
            rewrite_invalid_reference(&diagnostic).unwrap_or(diagnostic)
        } else {
            diagnostic
        };
        Self {
            message,
            statement: statement.into(),
            batch_size,
        }
    }

    /// Diagnostic message, possibly rewritten.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The statement that failed.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Number of statements in the failing transaction.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

fn batch_label(batch_size: &usize) -> String {
    match *batch_size {
        1 => "Insert query skipped".to_string(),
        n => format!("Fail loading batch of {n} queries"),
    }
}

fn rewrite_invalid_reference(diagnostic: &str) -> Option<String> {
    let mut quoted = diagnostic.split('\'').skip(1).step_by(2);
    let referenced = quoted.next()?;
    let property = quoted.next()?;
    let property = property.split(':').next().unwrap_or(property);
    Some(format!(
        "{INVALID_REFERENCE_TYPE} Referenced STIX objects of type '{referenced}' \
         are not valid for the property '{property}'"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_codes_follow_kind() {
        let err = TransformError::new(TransformErrorKind::UnspecifiedProperty)
            .with_detail("source_ref")
            .with_stix_id("relationship--1");
        assert_eq!(err.code(), 202);
        assert_eq!(
            err.to_string(),
            "[TransformationError 202] Unspecified property: source_ref (in 'relationship--1')"
        );
        assert_eq!(TransformErrorKind::Other.code(), 206);
        assert_eq!(
            TransformError::new(TransformErrorKind::Other).to_string(),
            format!("[TransformationError 206] {}", TransformErrorKind::Other.description())
        );
    }

    #[test]
    fn loading_error_rewrites_invalid_reference_diagnostic() {
        let err = LoadingError::new(
            "[THW08] Invalid Write: the type 'identity' is not allowed to play 'creator:created-by' here",
            "insert $x isa thing;",
            1,
        );
        assert_eq!(
            err.message(),
            "[THW08] Referenced STIX objects of type 'identity' are not valid for the property 'creator'"
        );
        assert!(err.to_string().starts_with("Insert query skipped due to"));
    }

    #[test]
    fn loading_error_keeps_other_diagnostics() {
        let err = LoadingError::new("[TQL03] syntax", "insert", 5);
        assert_eq!(err.message(), "[TQL03] syntax");
        assert_eq!(
            err.to_string(),
            "Fail loading batch of 5 queries due to a TypeDB insertion error.\n[TQL03] syntax\nFailed query:\ninsert"
        );
    }

    #[test]
    fn object_error_classifies_value_failures_as_data() {
        let err = ObjectError::from_convert(
            ConvertError::Value(ValueError::new("not a number")),
            "confidence",
            "indicator--1",
        );
        assert!(!err.is_config());
        match err {
            ObjectError::Data(inner) => assert_eq!(inner.code(), 204),
            other => panic!("unexpected {other:?}"),
        }
    }
}
