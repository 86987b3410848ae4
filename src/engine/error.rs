use ulid::Ulid;

use crate::model::Span;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// An existing reservation overlaps the proposed schedule.
    ScheduleConflict(Span),
    /// Access point does not belong to the site named in the request.
    WrongSite {
        access_point_id: Ulid,
        site_id: Ulid,
    },
    HasAccessPoints(Ulid),
    InUse(Ulid),
    Validation(Vec<String>),
    LimitExceeded(&'static str),
    WalError(String),
    Store(String),
}

impl EngineError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::ScheduleConflict(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::ScheduleConflict(span) => write!(
                f,
                "Schedule already exists for booking: Start - {} and End - {}",
                span.start, span.end
            ),
            EngineError::WrongSite {
                access_point_id,
                site_id,
            } => write!(
                f,
                "access point {access_point_id} does not belong to site {site_id}"
            ),
            EngineError::HasAccessPoints(id) => {
                write!(f, "cannot delete site {id}: has access points")
            }
            EngineError::InUse(id) => {
                write!(f, "cannot delete access point {id}: referenced by a booking")
            }
            EngineError::Validation(errors) => {
                write!(f, "validation failed: {}", errors.join("; "))
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_cites_bounds() {
        let e = EngineError::ScheduleConflict(Span::new(1000, 2000));
        assert_eq!(
            e.to_string(),
            "Schedule already exists for booking: Start - 1000 and End - 2000"
        );
        assert!(e.is_conflict());
    }

    #[test]
    fn validation_message_joins_errors() {
        let e = EngineError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "validation failed: a; b");
        assert!(!e.is_conflict());
    }
}
