use std::num::NonZeroUsize;

/// A bounded, ordered unit of work owned by exactly one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Zero-based position of this batch in the job.
    pub index: usize,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazily groups an iterator into batches of `size` items.
///
/// Every batch is full except possibly the last. Only the batch being
/// filled is buffered, and an empty input yields no batches at all.
pub struct Chunker<I> {
    inner: I,
    size: NonZeroUsize,
    next_index: usize,
    done: bool,
}

impl<I: Iterator> Chunker<I> {
    pub fn new(inner: I, size: NonZeroUsize) -> Self {
        Self {
            inner,
            size,
            next_index: 0,
            done: false,
        }
    }
}

impl<I: Iterator> Iterator for Chunker<I> {
    type Item = Batch<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut items = Vec::with_capacity(self.size.get());
        while items.len() < self.size.get() {
            match self.inner.next() {
                Some(item) => items.push(item),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if items.is_empty() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(Batch { index, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let mut chunks = Chunker::new(std::iter::empty::<u32>(), size(3));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn batch_count_is_ceiling_and_order_is_kept() {
        for n in 0..40usize {
            for b in 1..9usize {
                let batches: Vec<_> = Chunker::new(0..n, size(b)).collect();
                assert_eq!(batches.len(), n.div_ceil(b), "n={n} b={b}");
                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    if i + 1 < batches.len() {
                        assert_eq!(batch.len(), b);
                    } else {
                        assert!((1..=b).contains(&batch.len()));
                    }
                }
                let flat: Vec<_> = batches.into_iter().flat_map(|b| b.items).collect();
                assert_eq!(flat, (0..n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn pulls_lazily() {
        let mut pulled = 0;
        let source = std::iter::from_fn(|| {
            pulled += 1;
            Some(pulled)
        });
        let mut chunks = Chunker::new(source, size(4));
        let first = chunks.next().unwrap();
        assert_eq!(first.items, vec![1, 2, 3, 4]);
        drop(chunks);
        assert_eq!(pulled, 4);
    }

    #[test]
    fn stops_after_exhaustion() {
        let mut chunks = Chunker::new(vec![1, 2, 3].into_iter(), size(2));
        assert_eq!(chunks.next().unwrap().items, vec![1, 2]);
        assert_eq!(chunks.next().unwrap().items, vec![3]);
        assert!(chunks.next().is_none());
        assert!(chunks.next().is_none());
    }
}
