use crate::model::{Ms, Span, SpanError};

/// Converts a persisted schedule representation to spans and back.
pub trait ScheduleCodec: Send + Sync {
    fn encode(&self, spans: &[Span]) -> String;
    fn decode(&self, raw: &str) -> Result<Vec<Span>, ScheduleError>;
}

/// `start..end` pairs in Unix milliseconds joined by `;`, e.g. `1000..2000;5000..6000`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeListCodec;

impl ScheduleCodec for RangeListCodec {
    fn encode(&self, spans: &[Span]) -> String {
        spans
            .iter()
            .map(|s| format!("{}..{}", s.start, s.end))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn decode(&self, raw: &str) -> Result<Vec<Span>, ScheduleError> {
        let mut spans = Vec::new();
        for (i, entry) in raw.split(';').enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (start, end) = entry
                .split_once("..")
                .ok_or_else(|| ScheduleError::Malformed(i, entry.to_string()))?;
            let start = parse_ms(i, start)?;
            let end = parse_ms(i, end)?;
            let span = Span::try_new(start, end).map_err(|e| ScheduleError::Span(i, e))?;
            spans.push(span);
        }
        Ok(spans)
    }
}

fn parse_ms(entry: usize, raw: &str) -> Result<Ms, ScheduleError> {
    raw.trim()
        .parse()
        .map_err(|_| ScheduleError::Malformed(entry, raw.trim().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    Malformed(usize, String),
    Span(usize, SpanError),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::Malformed(i, s) => write!(f, "schedule entry {i}: malformed '{s}'"),
            ScheduleError::Span(i, e) => write!(f, "schedule entry {i}: {e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_list() {
        let spans = RangeListCodec.decode("1000..2000; 5000..6000").unwrap();
        assert_eq!(spans, vec![Span::new(1000, 2000), Span::new(5000, 6000)]);
    }

    #[test]
    fn decode_skips_empty_entries() {
        let spans = RangeListCodec.decode("1000..2000;;").unwrap();
        assert_eq!(spans, vec![Span::new(1000, 2000)]);
        assert!(RangeListCodec.decode("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_inverted_span() {
        let err = RangeListCodec.decode("1000..2000;3000..3000").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::Span(1, SpanError::Invalid { start: 3000, end: 3000 })
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            RangeListCodec.decode("tomorrow"),
            Err(ScheduleError::Malformed(0, _))
        ));
        assert!(matches!(
            RangeListCodec.decode("1000..noon"),
            Err(ScheduleError::Malformed(0, _))
        ));
    }

    #[test]
    fn encode_then_decode() {
        let spans = vec![Span::new(-500, 0), Span::new(10, 20)];
        let raw = RangeListCodec.encode(&spans);
        assert_eq!(raw, "-500..0;10..20");
        assert_eq!(RangeListCodec.decode(&raw).unwrap(), spans);
    }
}
