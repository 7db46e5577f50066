use thiserror::Error;

/// Every failure the compiler core can report.
///
/// Registry errors (`UnknownType`, `UnknownField`, `DuplicateType`,
/// `CyclicType`, `DelimiterDepth`) are fatal for the whole run: a partially
/// resolved type graph cannot be trusted. `Coercion` and
/// `DuplicatePrimaryKey` abort only the table they name. `Internal` marks a
/// shape/value mismatch reaching the encoder, which is a defect in the
/// caller, not bad input.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error in type string {text:?}: {detail}")]
    Syntax { text: String, detail: String },

    #[error("The type {0:?} is defined twice")]
    DuplicateType(String),

    #[error("The type {name:?} is not defined (field {field:?})")]
    UnknownType { name: String, field: String },

    #[error("Primary key field {field:?} does not exist in table {table:?}")]
    UnknownField { table: String, field: String },

    #[error("Recursive nesting of {0:?} is not allowed (cycle: {1})")]
    CyclicType(String, String),

    #[error(
        "Field {field:?}: {given} delimiter(s) for {required} collection level(s) in {text:?}"
    )]
    DelimiterDepth {
        field: String,
        text: String,
        given: usize,
        required: usize,
    },

    #[error(
        "Table {table:?}: primary key field {field:?} must be a scalar key type (int, long, bool, string or enum)"
    )]
    InvalidPrimaryKey { table: String, field: String },

    #[error("Table {table:?}, row {row}, field {field:?}: {detail}")]
    Coercion {
        table: String,
        row: usize,
        field: String,
        detail: String,
    },

    #[error(
        "Table {table:?}: duplicate primary key {key} (rows {first_row} and {row})"
    )]
    DuplicatePrimaryKey {
        table: String,
        key: String,
        first_row: usize,
        row: usize,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SheetError {
    /// Wraps a field-local coercion failure with its table and row identity.
    pub fn at_row(self, table: &str, row: usize) -> SheetError {
        match self {
            SheetError::Coercion {
                field, detail, ..
            } => SheetError::Coercion {
                table: table.to_owned(),
                row,
                field,
                detail,
            },
            other => other,
        }
    }
}
