use crate::defs::FeedSink;

pub struct NullSink;

impl<T> FeedSink<T> for NullSink {
    fn present(&mut self, _items: &[T], _has_more: bool) {
        // Nothing is listening, so nothing is drawn.
    }
}
