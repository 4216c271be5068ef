//! List Reconciliation
//!
//! A [`Reconciler`] keeps, per list, the ordered entries it placed on the
//! previous call and brings the DOM in line with a new item list:
//!
//! 1. Previous entries are looked up by key (keyed mode) or by position
//!    (unkeyed mode).
//! 2. New items are walked in order. A missing entry is created and inserted
//!    right after the last placed node. An existing entry is updated in
//!    place, and moved only if its previous sibling is not the last placed
//!    node.
//! 3. Entries whose key was not seen are destroyed.
//!
//! A key that survives between calls keeps its node, and each node moves at
//! most once per pass. Moving `[1, 2, 3]` to `[3, 1, 2]` costs one move and
//! no creations.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;
use tracing::debug;

use crate::dom::{Document, DomId, NodeType};
use crate::error::{Error, Result};

/// Identifies one managed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKey {
    /// The list owns `parent`'s children, starting from the front.
    Children(DomId),
    /// The list starts right after `anchor`, in whatever parent the anchor
    /// currently has.
    After(DomId),
}

impl ListKey {
    fn node(self) -> DomId {
        match self {
            Self::Children(id) | Self::After(id) => id,
        }
    }
}

/// Identity of an item across calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey<K> {
    Keyed(K),
    /// Unkeyed mode: the item's position.
    Index(usize),
}

/// One placed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry<T, K> {
    pub key: ItemKey<K>,
    pub node: DomId,
    pub item: T,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub moved: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Per-document list bookkeeping.
///
/// # Example
///
/// ```rust
/// use dahlia_core::dom::{Document, DomId};
/// use dahlia_core::reconcile::{ListKey, Reconciler};
///
/// let doc = Document::new();
/// let ul = doc.create_element("ul");
/// let mut lists: Reconciler<u32, u32> = Reconciler::new(&doc);
///
/// let key = |n: &u32| *n;
/// let create = |n: &u32| -> dahlia_core::Result<DomId> {
///     let li = doc.create_element("li");
///     doc.append_child(li, doc.create_text_node(&n.to_string()))?;
///     Ok(li)
/// };
///
/// lists.reconcile(ListKey::Children(ul), vec![1, 2, 3], Some(&key), create, |_, _| Ok(()))?;
/// let stats = lists.reconcile(ListKey::Children(ul), vec![3, 1, 2], Some(&key), create, |_, _| Ok(()))?;
///
/// assert_eq!((stats.created, stats.moved), (0, 1));
/// assert_eq!(doc.text_content(ul), "312");
/// # Ok::<(), dahlia_core::Error>(())
/// ```
pub struct Reconciler<T, K> {
    document: Document,
    lists: HashMap<ListKey, Vec<ListEntry<T, K>>>,
}

impl<T, K> Reconciler<T, K>
where
    K: Hash + Eq + Clone + Debug,
{
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            lists: HashMap::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Reconcile `list` against `items`.
    ///
    /// `create` builds the node for a new item; `update` receives the kept
    /// node and the new value for an existing one. Without `key_fn` items are
    /// matched by position.
    ///
    /// Duplicate keys fail with [`Error::DuplicateKey`] before anything is
    /// touched. If `create`, `update` or a move fails part way, the pass
    /// stops there; entries placed so far and entries not yet visited stay
    /// managed.
    pub fn reconcile<C, U>(
        &mut self,
        list: ListKey,
        items: Vec<T>,
        key_fn: Option<&dyn Fn(&T) -> K>,
        mut create: C,
        mut update: U,
    ) -> Result<ReconcileStats>
    where
        C: FnMut(&T) -> Result<DomId>,
        U: FnMut(DomId, &T) -> Result<()>,
    {
        self.prune();

        let keys = item_keys(&items, key_fn)?;
        let (parent, anchor) = self.resolve(list)?;

        let mut previous: IndexMap<ItemKey<K>, ListEntry<T, K>> = self
            .lists
            .remove(&list)
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        let mut placed: Vec<ListEntry<T, K>> = Vec::with_capacity(items.len());
        let mut stats = ReconcileStats::default();
        let mut last = anchor;

        let outcome = keys.into_iter().zip(items).try_for_each(|(key, item)| {
            match previous.shift_remove(&key) {
                Some(entry) => {
                    let node = entry.node;
                    if let Err(error) = update(node, &item) {
                        placed.push(entry);
                        return Err(error);
                    }
                    stats.updated += 1;
                    let in_place = self.document.previous_sibling(node) == last;
                    placed.push(ListEntry { key, node, item });
                    if !in_place {
                        self.insert_after(parent, node, last)?;
                        stats.moved += 1;
                    }
                    last = Some(node);
                }
                None => {
                    let node = create(&item)?;
                    if self.document.node_type(node) == Some(NodeType::Fragment) {
                        return Err(Error::dom("list items must be single nodes"));
                    }
                    if let Err(error) = self.insert_after(parent, node, last) {
                        self.document.destroy(node);
                        return Err(error);
                    }
                    stats.created += 1;
                    placed.push(ListEntry { key, node, item });
                    last = Some(node);
                }
            }
            Ok(())
        });

        if let Err(error) = outcome {
            placed.extend(previous.into_values());
            self.lists.insert(list, placed);
            return Err(error);
        }

        for entry in previous.into_values() {
            self.document.destroy(entry.node);
            stats.removed += 1;
        }
        self.lists.insert(list, placed);

        debug!(
            list = ?list,
            created = stats.created,
            moved = stats.moved,
            removed = stats.removed,
            "reconciled list"
        );
        Ok(stats)
    }

    /// Entries currently managed for `list`, in DOM order.
    pub fn entries(&self, list: &ListKey) -> &[ListEntry<T, K>] {
        self.lists.get(list).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Seed `list` with nodes that already exist, such as server-rendered
    /// items found during hydration.
    pub fn adopt(&mut self, list: ListKey, entries: Vec<ListEntry<T, K>>) {
        self.lists.insert(list, entries);
    }

    /// Stop managing `list` without touching its nodes.
    pub fn forget(&mut self, list: &ListKey) -> Option<Vec<ListEntry<T, K>>> {
        self.lists.remove(list)
    }

    /// Number of lists currently managed.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Drop bookkeeping for lists whose parent or anchor was destroyed.
    fn prune(&mut self) {
        let document = &self.document;
        self.lists.retain(|list, _| document.contains(list.node()));
    }

    fn resolve(&self, list: ListKey) -> Result<(DomId, Option<DomId>)> {
        match list {
            ListKey::Children(parent) if self.document.contains(parent) => Ok((parent, None)),
            ListKey::After(anchor) => self
                .document
                .parent(anchor)
                .map(|parent| (parent, Some(anchor)))
                .ok_or_else(|| Error::dom(format!("list anchor {anchor} is detached"))),
            ListKey::Children(parent) => Err(Error::dom(format!("list parent {parent} does not exist"))),
        }
    }

    fn insert_after(&self, parent: DomId, node: DomId, last: Option<DomId>) -> Result<()> {
        let reference = match last {
            Some(last) => self.document.next_sibling(last),
            None => self.document.first_child(parent),
        };
        self.document.insert_before(parent, node, reference)
    }
}

impl<T, K> Debug for Reconciler<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("lists", &self.lists.len())
            .finish()
    }
}

fn item_keys<T, K>(items: &[T], key_fn: Option<&dyn Fn(&T) -> K>) -> Result<Vec<ItemKey<K>>>
where
    K: Hash + Eq + Clone + Debug,
{
    let Some(key_fn) = key_fn else {
        return Ok((0..items.len()).map(ItemKey::Index).collect());
    };
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .map(|item| {
            let key = key_fn(item);
            if !seen.insert(key.clone()) {
                return Err(Error::DuplicateKey {
                    key: format!("{key:?}"),
                });
            }
            Ok(ItemKey::Keyed(key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fixture {
        doc: Document,
        parent: DomId,
        lists: Reconciler<&'static str, &'static str>,
        created: Cell<usize>,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = Document::new();
            let parent = doc.create_element("ul");
            Self {
                lists: Reconciler::new(&doc),
                doc,
                parent,
                created: Cell::new(0),
            }
        }

        fn run(&mut self, items: &[&'static str], keyed: bool) -> Result<ReconcileStats> {
            let key = |item: &&'static str| *item;
            let doc = self.doc.clone();
            let created = &self.created;
            self.lists.reconcile(
                ListKey::Children(self.parent),
                items.to_vec(),
                keyed.then_some(&key as &dyn Fn(&&'static str) -> &'static str),
                |item| {
                    created.set(created.get() + 1);
                    let li = doc.create_element("li");
                    doc.append_child(li, doc.create_text_node(item))?;
                    Ok(li)
                },
                |node, item| {
                    let text = doc.first_child(node).ok_or_else(|| Error::dom("empty item"))?;
                    doc.set_data(text, item)
                },
            )
        }

        fn text(&self) -> String {
            self.doc
                .children(self.parent)
                .into_iter()
                .map(|child| self.doc.text_content(child))
                .collect::<Vec<_>>()
                .join(",")
        }
    }

    #[test]
    fn rotation_keeps_identity_and_moves_once() {
        let mut fx = Fixture::new();
        fx.run(&["1", "2", "3"], true).unwrap();
        let before = fx.doc.children(fx.parent);

        let stats = fx.run(&["3", "1", "2"], true).unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(fx.text(), "3,1,2");
        assert_eq!(fx.doc.children(fx.parent), vec![before[2], before[0], before[1]]);
    }

    #[test]
    fn unchanged_order_moves_nothing() {
        let mut fx = Fixture::new();
        fx.run(&["a", "b"], true).unwrap();
        let stats = fx.run(&["a", "b"], true).unwrap();
        assert_eq!(stats, ReconcileStats { updated: 2, ..Default::default() });
    }

    #[test]
    fn removed_keys_are_destroyed() {
        let mut fx = Fixture::new();
        fx.run(&["a", "b", "c"], true).unwrap();
        let b = fx.doc.children(fx.parent)[1];

        let stats = fx.run(&["a", "c", "d"], true).unwrap();
        assert_eq!((stats.created, stats.removed), (1, 1));
        assert!(!fx.doc.contains(b));
        assert_eq!(fx.text(), "a,c,d");
    }

    #[test]
    fn empty_list_removes_everything() {
        let mut fx = Fixture::new();
        fx.run(&["a", "b"], true).unwrap();
        let stats = fx.run(&[], true).unwrap();
        assert_eq!(stats.removed, 2);
        assert!(fx.doc.children(fx.parent).is_empty());
        assert!(fx.lists.entries(&ListKey::Children(fx.parent)).is_empty());
    }

    #[test]
    fn duplicate_keys_fail_before_touching_dom() {
        let mut fx = Fixture::new();
        fx.run(&["a"], true).unwrap();
        let html = fx.doc.to_html(fx.parent);

        let err = fx.run(&["b", "b"], true).unwrap_err();
        assert_eq!(err, Error::DuplicateKey { key: "\"b\"".into() });
        assert_eq!(fx.doc.to_html(fx.parent), html);
        assert_eq!(fx.lists.entries(&ListKey::Children(fx.parent)).len(), 1);
    }

    #[test]
    fn unkeyed_mode_reuses_positions() {
        let mut fx = Fixture::new();
        fx.run(&["a", "b"], false).unwrap();
        let before = fx.doc.children(fx.parent);

        let stats = fx.run(&["x", "b", "c"], false).unwrap();
        assert_eq!((stats.created, stats.moved, stats.updated), (1, 0, 2));
        assert_eq!(fx.text(), "x,b,c");
        assert_eq!(&fx.doc.children(fx.parent)[..2], &before[..]);
        assert_eq!(fx.created.get(), 3);
    }

    #[test]
    fn anchored_list_follows_its_anchor() {
        let doc = Document::new();
        let fragment = doc.create_fragment();
        let start = doc.create_comment("dh:b:0");
        let end = doc.create_comment("/dh:b");
        doc.append_child(fragment, start).unwrap();
        doc.append_child(fragment, end).unwrap();

        let mut lists: Reconciler<u8, u8> = Reconciler::new(&doc);
        let key = |n: &u8| *n;
        let create = |n: &u8| Ok(doc.create_text_node(&n.to_string()));
        lists
            .reconcile(ListKey::After(start), vec![1, 2], Some(&key), create, |_, _| Ok(()))
            .unwrap();

        // Moving the region into a real parent keeps the list intact.
        let div = doc.create_element("div");
        doc.append_child(div, fragment).unwrap();
        lists
            .reconcile(ListKey::After(start), vec![2, 1], Some(&key), create, |_, _| Ok(()))
            .unwrap();

        assert_eq!(doc.inner_html(div), "<!--dh:b:0-->21<!--/dh:b-->");
    }

    #[test]
    fn failed_move_keeps_the_entry_managed() {
        let doc = Document::new();
        let ul = doc.create_element("ul");
        let elsewhere = doc.create_element("div");
        let marker = doc.create_comment("");
        doc.append_child(elsewhere, marker).unwrap();

        let mut lists: Reconciler<&'static str, &'static str> = Reconciler::new(&doc);
        let key: &dyn Fn(&&'static str) -> &'static str = &|item| *item;
        let create = |_: &&'static str| Ok(doc.create_element("li"));
        lists
            .reconcile(ListKey::Children(ul), vec!["a", "b", "c"], Some(key), create, |_, _| Ok(()))
            .unwrap();
        let c = doc.children(ul)[2];

        // Pulling the previous item out of the list leaves no valid spot for "b".
        let err = lists
            .reconcile(ListKey::Children(ul), vec!["c", "b", "a"], Some(key), create, |_, item| {
                if *item == "b" {
                    doc.insert_before(elsewhere, c, Some(marker))?;
                }
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, Error::Dom { .. }));
        let managed: Vec<&str> = lists
            .entries(&ListKey::Children(ul))
            .iter()
            .map(|entry| entry.item)
            .collect();
        assert_eq!(managed, vec!["c", "b", "a"]);
    }

    #[test]
    fn destroyed_parents_are_pruned() {
        let mut fx = Fixture::new();
        fx.run(&["a"], true).unwrap();
        assert_eq!(fx.lists.len(), 1);

        fx.doc.destroy(fx.parent);
        let other = fx.doc.create_element("ol");
        let mut other_list: Reconciler<&str, &str> = Reconciler::new(&fx.doc);
        other_list.adopt(ListKey::Children(fx.parent), Vec::new());
        other_list
            .reconcile(ListKey::Children(other), Vec::new(), None, |_| Err(Error::dom("unused")), |_, _| Ok(()))
            .unwrap();
        assert_eq!(other_list.len(), 1);
        assert!(other_list.entries(&ListKey::Children(fx.parent)).is_empty());
    }
}
