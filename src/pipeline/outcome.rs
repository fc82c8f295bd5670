//! Span annotation for successful outcomes.

use crate::observability::{Span, TagValue};

/// Tag key carrying the number of items an operation produced.
pub const COUNT_TAG: &str = "count";

/// Outcome metadata written onto the span when work succeeds.
pub trait Annotate {
    fn annotate(&self, span: &mut Span);
}

impl Annotate for () {
    fn annotate(&self, _span: &mut Span) {}
}

impl<T> Annotate for Vec<T> {
    fn annotate(&self, span: &mut Span) {
        span.set_tag(COUNT_TAG, self.len());
    }
}

impl<T> Annotate for Option<T>
where
    T: Annotate,
{
    fn annotate(&self, span: &mut Span) {
        if let Some(inner) = self {
            inner.annotate(span);
        }
    }
}

macro_rules! annotate_count {
    ($($ty:ty),*) => {
        $(
            impl Annotate for $ty {
                fn annotate(&self, span: &mut Span) {
                    span.set_tag(COUNT_TAG, TagValue::Int(i64::try_from(*self).unwrap_or(i64::MAX)));
                }
            }
        )*
    };
}

annotate_count!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{InMemoryExporter, SpanTracker};
    use std::sync::Arc;

    fn annotated(value: impl Annotate) -> Option<TagValue> {
        let buffer = Arc::new(InMemoryExporter::new(4));
        let tracker = SpanTracker::builder("test").exporter(buffer.clone()).build();
        let mut span = tracker.start_span("op");
        value.annotate(&mut span);
        drop(span);
        buffer.finished()[0].tag(COUNT_TAG).cloned()
    }

    #[test]
    fn test_integer_counts() {
        assert_eq!(annotated(5), Some(TagValue::Int(5)));
        assert_eq!(annotated(-3i64), Some(TagValue::Int(-3)));
        assert_eq!(annotated(7u8), Some(TagValue::Int(7)));
        assert_eq!(annotated(u64::MAX), Some(TagValue::Int(i64::MAX)));
    }

    #[test]
    fn test_collections_and_unit() {
        assert_eq!(annotated(vec!["a", "b"]), Some(TagValue::Int(2)));
        assert_eq!(annotated(Some(4usize)), Some(TagValue::Int(4)));
        assert_eq!(annotated(None::<u32>), None);
        assert_eq!(annotated(()), None);
    }
}
