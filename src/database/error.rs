use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotFound,
    ConnectionFailure,
    Timeout,
    Decode,
    Other,
}

#[derive(Debug, Error)]
#[error("database error ({kind:?}): {message}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub message: String,
    /// Constraint name for unique/foreign-key violations, when Postgres
    /// reports one.
    pub constraint: Option<String>,
}

impl DatabaseError {
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => Self {
                kind: DatabaseErrorKind::NotFound,
                message: "row not found".to_string(),
                constraint: None,
            },
            sqlx::Error::PoolTimedOut => Self {
                kind: DatabaseErrorKind::Timeout,
                message: "timed out acquiring a connection".to_string(),
                constraint: None,
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => Self {
                kind: DatabaseErrorKind::ConnectionFailure,
                message: error.to_string(),
                constraint: None,
            },
            sqlx::Error::Database(db) => {
                let kind = match db.code().as_deref() {
                    Some("23505") => DatabaseErrorKind::UniqueViolation,
                    Some("23503") => DatabaseErrorKind::ForeignKeyViolation,
                    _ => DatabaseErrorKind::Other,
                };
                Self {
                    kind,
                    message: db.message().to_string(),
                    constraint: db.constraint().map(|c| c.to_string()),
                }
            }
            _ => Self {
                kind: DatabaseErrorKind::Other,
                message: error.to_string(),
                constraint: None,
            },
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: DatabaseErrorKind::Decode,
            message: message.into(),
            constraint: None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == DatabaseErrorKind::UniqueViolation
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailure | DatabaseErrorKind::Timeout
        )
    }
}
