use crate::engine::types::{FastMap, FastSet, RowId};
use serde::Serialize;
use std::sync::Arc;

/// One page of a selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectionPage {
    pub row_ids: Vec<RowId>,
    pub first_row: usize,
    /// Zero-based position of the last returned row inside the selection.
    pub last_row_index: Option<usize>,
}

impl SelectionPage {
    pub fn empty(first_row: usize) -> Self {
        Self {
            row_ids: Vec::new(),
            first_row,
            last_row_index: None,
        }
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }
}

/// Ordered row ids stored in fixed-size chunks.
///
/// Every chunk except the last is full, so the chunk holding a position is
/// `position / chunk_size`. A row's paging sequence number is its position
/// plus one; it is strictly increasing along the selection. Chunks are shared
/// between snapshots: appending copies only the tail chunk.
#[derive(Debug, Clone)]
pub(crate) struct SelectionData {
    chunks: Vec<Arc<[RowId]>>,
    positions: Arc<FastMap<RowId, usize>>,
    chunk_size: usize,
    len: usize,
}

impl SelectionData {
    pub fn empty(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            positions: Arc::new(FastMap::default()),
            chunk_size: chunk_size.max(1),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn contains(&self, row_id: &RowId) -> bool {
        self.positions.contains_key(row_id)
    }

    /// Paging sequence number of a row (1-based).
    pub fn seq_of(&self, row_id: &RowId) -> Option<u64> {
        self.positions.get(row_id).map(|p| *p as u64 + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowId> {
        self.chunks.iter().flat_map(|c| c.iter())
    }

    pub fn page(&self, first_row: usize, page_length: usize) -> SelectionPage {
        if first_row >= self.len || page_length == 0 {
            return SelectionPage::empty(first_row);
        }
        let end = first_row.saturating_add(page_length).min(self.len);
        let mut row_ids = Vec::with_capacity(end - first_row);
        let mut position = first_row;
        while position < end {
            let chunk = &self.chunks[position / self.chunk_size];
            let offset = position % self.chunk_size;
            let take = (chunk.len() - offset).min(end - position);
            row_ids.extend_from_slice(&chunk[offset..offset + take]);
            position += take;
        }
        SelectionPage {
            row_ids,
            first_row,
            last_row_index: Some(end - 1),
        }
    }

    /// New snapshot with `ids` appended in the given order. Ids already
    /// present are skipped.
    pub fn appended(&self, ids: impl IntoIterator<Item = RowId>) -> Self {
        let mut builder = SelectionBuilder::resume(self);
        for id in ids {
            builder.push(id);
        }
        builder.finish()
    }

    /// New snapshot without `ids`; the remaining rows keep their relative
    /// order and are renumbered.
    pub fn without(&self, ids: &FastSet<RowId>) -> Self {
        let mut builder = SelectionBuilder::new(self.chunk_size);
        for id in self.iter() {
            if !ids.contains(id) {
                builder.push(id.clone());
            }
        }
        builder.finish()
    }
}

/// Accumulates rows chunk by chunk.
pub(crate) struct SelectionBuilder {
    chunks: Vec<Arc<[RowId]>>,
    current: Vec<RowId>,
    positions: FastMap<RowId, usize>,
    chunk_size: usize,
    len: usize,
}

impl SelectionBuilder {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunks: Vec::new(),
            current: Vec::with_capacity(chunk_size),
            positions: FastMap::default(),
            chunk_size,
            len: 0,
        }
    }

    fn resume(data: &SelectionData) -> Self {
        let mut chunks = data.chunks.clone();
        let current = match chunks.last() {
            Some(last) if last.len() < data.chunk_size => {
                let tail = last.to_vec();
                chunks.pop();
                tail
            }
            _ => Vec::with_capacity(data.chunk_size),
        };
        Self {
            chunks,
            current,
            positions: (*data.positions).clone(),
            chunk_size: data.chunk_size,
            len: data.len,
        }
    }

    /// Returns true when a chunk was sealed by this push.
    pub fn push(&mut self, row_id: RowId) -> bool {
        if self.positions.contains_key(&row_id) {
            return false;
        }
        self.positions.insert(row_id.clone(), self.len);
        self.current.push(row_id);
        self.len += 1;
        if self.current.len() == self.chunk_size {
            let sealed = std::mem::replace(&mut self.current, Vec::with_capacity(self.chunk_size));
            self.chunks.push(sealed.into());
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn finish(mut self) -> SelectionData {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current).into());
        }
        SelectionData {
            chunks: self.chunks,
            positions: Arc::new(self.positions),
            chunk_size: self.chunk_size,
            len: self.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<RowId> {
        (0..n).map(|i| RowId::record(format!("{i}"))).collect()
    }

    fn build(n: usize, chunk: usize) -> SelectionData {
        let mut b = SelectionBuilder::new(chunk);
        for id in ids(n) {
            b.push(id);
        }
        b.finish()
    }

    #[test]
    fn test_pages_cross_chunk_boundaries() {
        let data = build(10, 3);
        assert_eq!(data.chunk_count(), 4);
        let page = data.page(2, 5);
        assert_eq!(page.row_ids, ids(10)[2..7].to_vec());
        assert_eq!(page.last_row_index, Some(6));
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let data = build(3, 2);
        assert!(data.page(3, 2).is_empty());
        assert_eq!(data.page(2, 2).row_ids, vec![RowId::record("2")]);
        assert!(data.page(0, 0).is_empty());
        assert_eq!(data.page(0, usize::MAX).len(), 3);
    }

    #[test]
    fn test_append_shares_full_chunks() {
        let data = build(4, 2);
        let more = data.appended([RowId::record("x"), RowId::record("0")]);
        assert_eq!(more.len(), 5);
        assert!(Arc::ptr_eq(&data.chunks[0], &more.chunks[0]));
        assert_eq!(more.seq_of(&RowId::record("x")), Some(5));
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_without_renumbers() {
        let data = build(5, 2).without(&[RowId::record("1")].into_iter().collect());
        assert_eq!(data.len(), 4);
        assert_eq!(data.seq_of(&RowId::record("2")), Some(2));
        assert!(!data.contains(&RowId::record("1")));
        let all: Vec<_> = data.iter().cloned().collect();
        assert_eq!(all, vec![RowId::record("0"), RowId::record("2"), RowId::record("3"), RowId::record("4")]);
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let data = build(7, 3);
        let seqs: Vec<u64> = data.iter().filter_map(|id| data.seq_of(id)).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seqs.first(), Some(&1));
    }
}
