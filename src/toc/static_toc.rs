//! A TOC over an unchanging array of items.
//!
//! No overlay support and no variable height support: the ordering key of an
//! item is its index, and so is its id.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::resource::{Refed, RefedResource};

use super::{BaseToc, ItemId, OrderingKey, SliceData, SliceState, Toc, TocOptions};

pub struct StaticToc {
    base: BaseToc,
    items: Vec<Value>,
}

impl StaticToc {
    pub fn new(items: Vec<Value>, options: TocOptions) -> Self {
        let toc = Self {
            base: BaseToc::new(options),
            items,
        };
        toc.deactivate_toc(true);
        toc
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    async fn activate_toc(&self) -> Result<()> {
        Ok(())
    }

    fn deactivate_toc(&self, _first_time: bool) {}
}

#[async_trait]
impl Refed for StaticToc {
    fn refed(&self) -> &RefedResource {
        self.base.refed()
    }

    async fn activate(&self) -> Result<()> {
        self.base.activate(self.activate_toc()).await
    }

    fn deactivate(&self) {
        self.base.deactivate(|| self.deactivate_toc(false));
    }
}

impl Toc for StaticToc {
    fn base(&self) -> &BaseToc {
        &self.base
    }

    fn toc_type(&self) -> &'static str {
        "StaticTOC"
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn total_height(&self) -> usize {
        self.items.len()
    }

    fn top_ordering_key(&self) -> OrderingKey {
        0
    }

    fn ordering_key_for_index(&self, index: usize) -> OrderingKey {
        index
    }

    fn find_index_for_ordering_key(&self, key: OrderingKey) -> usize {
        key
    }

    fn data_for_slice_range(
        &self,
        begin_inclusive: usize,
        end_exclusive: usize,
        already_known: &BTreeSet<ItemId>,
    ) -> SliceData {
        let end_exclusive = end_exclusive.min(self.items.len());

        let mut ids = Vec::new();
        let mut state = BTreeMap::new();
        let mut new_valid_data_set = BTreeSet::new();

        for (id, item) in self
            .items
            .iter()
            .enumerate()
            .take(end_exclusive)
            .skip(begin_inclusive)
        {
            ids.push(id);
            new_valid_data_set.insert(id);
            if already_known.contains(&id) {
                continue;
            }
            state.insert(
                id,
                SliceState {
                    item: item.clone(),
                    overlays: None,
                    match_info: None,
                },
            );
        }

        SliceData {
            ids,
            state,
            pending_reads: None,
            read_future: None,
            new_valid_data_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ContextId;
    use serde_json::json;

    fn folders() -> StaticToc {
        StaticToc::new(
            vec![
                json!({"name": "Inbox"}),
                json!({"name": "Sent"}),
                json!({"name": "Calendar"}),
            ],
            TocOptions::default(),
        )
    }

    #[test]
    fn test_ordering_key_is_index() {
        let toc = folders();
        assert_eq!(toc.len(), 3);
        assert_eq!(toc.total_height(), 3);
        assert_eq!(toc.top_ordering_key(), 0);
        assert_eq!(toc.ordering_key_for_index(2), 2);
        assert_eq!(toc.find_index_for_ordering_key(1), 1);
        assert!(!toc.height_aware());
        assert!(toc.overlay_namespace().is_none());
    }

    #[test]
    fn test_slice_is_clamped() {
        let toc = folders();
        let slice = toc.data_for_slice_range(1, 10, &BTreeSet::new());
        assert_eq!(slice.ids, vec![1, 2]);
        assert_eq!(slice.state.len(), 2);
        assert_eq!(slice.state[&1].item, json!({"name": "Sent"}));
        assert!(slice.pending_reads.is_none());
        assert!(slice.read_future.is_none());

        let empty = toc.data_for_slice_range(5, 10, &BTreeSet::new());
        assert!(empty.ids.is_empty());
    }

    #[test]
    fn test_known_ids_are_not_resent() {
        let toc = folders();
        let first = toc.data_for_slice_range(0, 3, &BTreeSet::new());
        let second = toc.data_for_slice_range(0, 3, &first.new_valid_data_set);
        assert_eq!(first.ids, second.ids);
        assert!(second.state.is_empty());
        assert_eq!(second.new_valid_data_set, first.new_valid_data_set);
    }

    #[tokio::test]
    async fn test_activation_marks_ever_activated() {
        let toc = folders();
        assert!(!toc.base().ever_activated());
        let ctx = ContextId::next();
        toc.acquire(ctx).await.unwrap();
        assert!(toc.base().ever_activated());
        toc.release(ctx).unwrap();
    }
}
