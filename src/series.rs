use std::collections::VecDeque;

/// A fixed-capacity ring buffer backed by VecDeque.
/// When full, pushing a new element automatically drops the oldest one.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an element. If at capacity, the oldest element is dropped.
    pub fn push(&mut self, item: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// One chart sample: a timestamp-derived label and a value.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub label: String,
    pub value: f64,
}

/// A windowed series of chart samples.
///
/// Capacity is derived from the active time span and the push cadence;
/// changing the span discards accumulated shape rather than resampling it.
#[derive(Clone, Debug)]
pub struct Series {
    points: RingBuffer<Sample>,
}

/// Samples arrive once per push cycle on the aggregate charts.
pub const PUSH_CADENCE_SECS: u64 = 1;

/// The per-tool activity chart keeps one point per minute.
pub const ENTITY_CADENCE_SECS: u64 = 60;

/// Number of samples a window spans at the given cadence.
pub fn window_capacity(span_secs: u64, cadence_secs: u64) -> usize {
    (span_secs / cadence_secs.max(1)).max(1) as usize
}

impl Series {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: RingBuffer::new(capacity.max(1)),
        }
    }

    /// Append one sample, evicting the oldest if the window is full.
    pub fn push(&mut self, label: String, value: f64) {
        self.points.push(Sample { label, value });
    }

    /// Drop all samples. Used on window-size and filter changes.
    pub fn reset(&mut self) {
        self.points.clear();
    }

    /// Change the window capacity. Discards existing samples; historical
    /// shape is not reinterpolated into the new window.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.points = RingBuffer::new(capacity.max(1));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.points.capacity
    }

    /// Values in arrival order, for the chart sink.
    pub fn values(&self) -> Vec<f32> {
        self.points.iter().map(|s| s.value as f32).collect()
    }

    /// Labels in arrival order, matching `values()`.
    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|s| s.label.clone()).collect()
    }

    #[cfg(test)]
    fn samples(&self) -> Vec<Sample> {
        self.points.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringbuffer_capacity() {
        let mut rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.push(3);
        assert_eq!(rb.len(), 3);
        rb.push(4);
        assert_eq!(rb.len(), 3);
        let items: Vec<_> = rb.iter().copied().collect();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn test_ringbuffer_empty() {
        let rb: RingBuffer<i32> = RingBuffer::new(5);
        assert_eq!(rb.len(), 0);
        assert_eq!(rb.iter().count(), 0);
    }

    #[test]
    fn series_never_exceeds_capacity() {
        let mut s = Series::new(4);
        for i in 0..50 {
            s.push(format!("t{i}"), i as f64);
            assert!(s.len() <= 4);
        }
    }

    #[test]
    fn series_keeps_most_recent_suffix() {
        let mut s = Series::new(3);
        for i in 0..10 {
            s.push(format!("t{i}"), i as f64);
        }
        let values = s.values();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
        assert_eq!(s.labels(), vec!["t7", "t8", "t9"]);
    }

    #[test]
    fn reset_empties_and_grows_one_per_push() {
        let mut s = Series::new(10);
        for i in 0..5 {
            s.push(format!("t{i}"), i as f64);
        }
        s.reset();
        assert!(s.is_empty());
        s.push("t5".into(), 5.0);
        assert_eq!(s.len(), 1);
        s.push("t6".into(), 6.0);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn set_capacity_discards_samples() {
        let mut s = Series::new(5);
        s.push("a".into(), 1.0);
        s.push("b".into(), 2.0);
        s.set_capacity(120);
        assert!(s.samples().is_empty());
        assert_eq!(s.capacity(), 120);
    }

    #[test]
    fn window_capacity_from_span() {
        assert_eq!(window_capacity(1800, PUSH_CADENCE_SECS), 1800);
        assert_eq!(window_capacity(1800, ENTITY_CADENCE_SECS), 30);
        assert_eq!(window_capacity(60, ENTITY_CADENCE_SECS), 1);
        // never zero, even for degenerate spans
        assert_eq!(window_capacity(10, ENTITY_CADENCE_SECS), 1);
    }
}
