use tracing::{debug, info};

use dyntree_store::{Item, Row, StoreError, TableSchema, TableStore, WriteRequest};

use crate::batch::{BatchReport, BatchWriter};
use crate::codec::Storable;
use crate::config::TreeConfig;
use crate::error::Result;
use crate::link::LinkResolver;
use crate::path::PathCodec;

/// Hierarchical tree of objects and links stored in one table.
///
/// Every operation is a synchronous sequence of store round-trips. The tree
/// holds no state beyond its configuration, so sharing one across threads
/// is as safe as sharing the store itself.
pub struct Tree<S: TableStore> {
    store: S,
    config: TreeConfig,
    codec: PathCodec,
}

impl<S: TableStore> Tree<S> {
    /// Build a tree over `store`. The configuration is validated here.
    pub fn new(store: S, config: TreeConfig) -> Result<Self> {
        let config = config.validated()?;
        let codec = PathCodec::new(config.delimiter.clone());
        Ok(Self {
            store,
            config,
            codec,
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The backing table store.
    pub fn table_store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Create the backing table. An existing table counts as success.
    pub fn create_table(&self) -> Result<()> {
        match self
            .store
            .create_table(&self.config.table_name, &TableSchema::default())
        {
            Ok(()) => {
                info!(table = %self.config.table_name, "created table");
                Ok(())
            }
            Err(StoreError::TableAlreadyExists(_)) => {
                debug!(table = %self.config.table_name, "table already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store `value` at `path`, replacing whatever was there.
    ///
    /// Writes one edge row per path component plus the object row. Validation
    /// and serialization happen before anything is written, but the rows
    /// themselves are not written atomically: a store failure part way
    /// through can leave edges without the object.
    pub fn store<P: AsRef<str>, T: Storable>(&self, path: &[P], value: &T) -> Result<()> {
        self.codec.validate_path(path)?;
        let item = value.to_item()?;
        let requests = self.codec.object_requests(path, item)?;
        let report = self.write(requests)?;
        debug!(path = %PathCodec::display(path), rows = report.requests, "stored object");
        Ok(())
    }

    /// Make `path` a link to `target`.
    ///
    /// The target does not have to exist; fetching a dangling link fails
    /// with `NotFound`.
    pub fn link<P: AsRef<str>, Q: AsRef<str>>(&self, path: &[P], target: &[Q]) -> Result<()> {
        let requests = self.codec.link_requests(path, target)?;
        let report = self.write(requests)?;
        debug!(
            path = %PathCodec::display(path),
            target = %PathCodec::display(target),
            rows = report.requests,
            "stored link"
        );
        Ok(())
    }

    /// Fetch and decode the value at `path`, following links.
    pub fn fetch<T: Storable, P: AsRef<str>>(&self, path: &[P]) -> Result<T> {
        let item = self.fetch_item(path)?;
        Ok(T::from_item(&item)?)
    }

    /// Raw attributes at `path`, following links.
    pub fn fetch_item<P: AsRef<str>>(&self, path: &[P]) -> Result<Item> {
        self.codec.validate_path(path)?;
        let (_, item) = self.resolver().resolve(path)?;
        Ok(item)
    }

    /// Immediate target of the link at `path`.
    ///
    /// Fails with `NotFound` if nothing is stored there and `NotLink` if an
    /// ordinary object is.
    pub fn link_target<P: AsRef<str>>(&self, path: &[P]) -> Result<Vec<String>> {
        self.codec.validate_path(path)?;
        self.resolver().target(path)
    }

    /// Visit the names of the immediate children of `prefix` in ascending
    /// byte order. The empty prefix lists the root.
    ///
    /// `visit` returns `false` to stop; no further pages are read after
    /// that. A failed query reaches `visit` once as an `Err`, and listing
    /// stops there.
    pub fn list<P, F>(&self, prefix: &[P], mut visit: F)
    where
        P: AsRef<str>,
        F: FnMut(Result<String>) -> bool,
    {
        if let Err(e) = self.codec.validate_prefix(prefix) {
            visit(Err(e));
            return;
        }

        let partition = self.codec.directory_partition(prefix);
        let outcome = self
            .store
            .query_pages(&self.config.table_name, &partition, &mut |rows: &[Row]| {
                debug!(partition = %partition, rows = rows.len(), "listing page");
                rows.iter().all(|row| visit(Ok(row.key.sort.clone())))
            });
        if let Err(e) = outcome {
            visit(Err(e.into()));
        }
    }

    /// Collect every child name of `prefix`.
    pub fn list_children<P: AsRef<str>>(&self, prefix: &[P]) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut failure = None;
        self.list(prefix, |entry| match entry {
            Ok(name) => {
                names.push(name);
                true
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(names),
        }
    }

    /// Remove the object (or link) at `path` and its edge in the parent.
    ///
    /// Ancestor edges and any children of `path` are left in place.
    pub fn delete<P: AsRef<str>>(&self, path: &[P]) -> Result<()> {
        let requests = self.codec.delete_requests(path)?;
        self.write(requests)?;
        debug!(path = %PathCodec::display(path), "deleted");
        Ok(())
    }

    fn write(&self, requests: Vec<WriteRequest>) -> Result<BatchReport> {
        BatchWriter::new(
            &self.store,
            &self.config.table_name,
            self.config.max_batch_items,
            &self.config.retry,
        )
        .apply(requests)
    }

    fn resolver(&self) -> LinkResolver<'_, S> {
        LinkResolver::new(
            &self.store,
            &self.config.table_name,
            &self.codec,
            self.config.max_link_hops,
        )
    }
}

impl<S: TableStore> std::fmt::Debug for Tree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dyntree_store::{AttributeValue, FileTableStore, InMemoryTableStore, MemoryStoreConfig, RowKey};
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use crate::codec::{self, CodecError};
    use crate::config::RetryPolicy;
    use crate::error::TreeError;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        email: String,
        logins: u32,
    }

    impl Storable for Account {
        fn to_item(&self) -> std::result::Result<Item, CodecError> {
            codec::to_item(self)
        }

        fn from_item(item: &Item) -> std::result::Result<Self, CodecError> {
            codec::from_item(item)
        }
    }

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            logins: 3,
        }
    }

    fn table_name() -> String {
        format!("tree-test-{}", Uuid::now_v7())
    }

    fn tree_with(store: Arc<InMemoryTableStore>, config: TreeConfig) -> Tree<Arc<InMemoryTableStore>> {
        let tree = Tree::new(store, config.with_retry(RetryPolicy::immediate())).unwrap();
        tree.create_table().unwrap();
        tree
    }

    fn new_tree() -> (Arc<InMemoryTableStore>, Tree<Arc<InMemoryTableStore>>) {
        let store = Arc::new(InMemoryTableStore::new());
        let tree = tree_with(store.clone(), TreeConfig::for_table(table_name()));
        (store, tree)
    }

    fn row_count(store: &InMemoryTableStore, tree: &Tree<Arc<InMemoryTableStore>>) -> usize {
        store.row_count(&tree.config().table_name).unwrap()
    }

    // ------------------------------------------------------------------
    // Store and fetch
    // ------------------------------------------------------------------

    #[test]
    fn accounts_scenario() {
        let (_store, tree) = new_tree();
        let alice = account("12345");

        tree.store(&["Accounts", "12345"], &alice).unwrap();
        tree.link(&["AccountsByEmail", "alice@example.com"], &["Accounts", "12345"])
            .unwrap();

        let via_link: Account = tree.fetch(&["AccountsByEmail", "alice@example.com"]).unwrap();
        assert_eq!(via_link, alice);
        assert_eq!(tree.list_children(&["Accounts"]).unwrap(), vec!["12345"]);
        assert_eq!(
            tree.link_target(&["AccountsByEmail", "alice@example.com"]).unwrap(),
            vec!["Accounts", "12345"]
        );

        tree.delete(&["Accounts", "12345"]).unwrap();
        assert!(tree
            .fetch::<Account, _>(&["Accounts", "12345"])
            .unwrap_err()
            .is_not_found());
        assert!(tree
            .fetch::<Account, _>(&["AccountsByEmail", "alice@example.com"])
            .unwrap_err()
            .is_not_found());
        assert!(tree.list_children(&["Accounts"]).unwrap().is_empty());
        assert_eq!(
            tree.list_children(&["AccountsByEmail"]).unwrap(),
            vec!["alice@example.com"]
        );
    }

    #[test]
    fn store_writes_edges_and_object_row() {
        let (store, tree) = new_tree();
        tree.store(&["a", "b", "c"], &account("1")).unwrap();
        assert_eq!(row_count(&store, &tree), 4);

        let table = &tree.config().table_name;
        assert!(store.get(table, &RowKey::new("¦", "a")).unwrap().is_some());
        assert!(store.get(table, &RowKey::new("¦a¦", "b")).unwrap().is_some());
        assert!(store.get(table, &RowKey::new("¦a¦b¦", "c")).unwrap().is_some());
        let object = store.get(table, &RowKey::new("¦a¦b¦c", "¦")).unwrap().unwrap();
        assert_eq!(object.attributes["id"], AttributeValue::from("1"));
    }

    #[test]
    fn overwrite_replaces_the_object() {
        let (store, tree) = new_tree();
        tree.store(&["a", "b"], &account("1")).unwrap();
        tree.store(&["a", "b"], &account("2")).unwrap();
        assert_eq!(tree.fetch::<Account, _>(&["a", "b"]).unwrap(), account("2"));
        assert_eq!(row_count(&store, &tree), 3);
    }

    #[test]
    fn store_over_link_replaces_the_link() {
        let (_store, tree) = new_tree();
        tree.store(&["obj"], &account("1")).unwrap();
        tree.link(&["l"], &["obj"]).unwrap();
        tree.store(&["l"], &account("2")).unwrap();
        assert!(matches!(tree.link_target(&["l"]), Err(TreeError::NotLink { .. })));
        assert_eq!(tree.fetch::<Account, _>(&["l"]).unwrap(), account("2"));
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let (_store, tree) = new_tree();
        let err = tree.fetch_item(&["nope"]).unwrap_err();
        assert!(matches!(err, TreeError::NotFound { ref path } if path == "/nope"));
    }

    #[test]
    fn parent_directory_has_no_object() {
        let (_store, tree) = new_tree();
        tree.store(&["dir", "leaf"], &account("1")).unwrap();
        assert!(tree.fetch_item(&["dir"]).unwrap_err().is_not_found());
    }

    #[test]
    fn empty_paths_are_rejected() {
        let (store, tree) = new_tree();
        let empty: [&str; 0] = [];
        assert!(matches!(tree.store(&empty, &account("1")), Err(TreeError::EmptyPath)));
        assert!(matches!(tree.fetch_item(&empty), Err(TreeError::EmptyPath)));
        assert!(matches!(tree.delete(&empty), Err(TreeError::EmptyPath)));
        assert!(matches!(tree.link(&["a"], &empty), Err(TreeError::EmptyPath)));
        assert!(matches!(
            tree.store(&["a", ""], &account("1")),
            Err(TreeError::EmptyComponent)
        ));
        assert_eq!(row_count(&store, &tree), 0);
    }

    // ------------------------------------------------------------------
    // Reserved characters
    // ------------------------------------------------------------------

    #[derive(Serialize, Deserialize)]
    struct Fields {
        #[serde(rename = "FooXBar")]
        ok: String,
        #[serde(rename = "Xfoo", skip_serializing_if = "Option::is_none")]
        reserved: Option<String>,
    }

    impl Storable for Fields {
        fn to_item(&self) -> std::result::Result<Item, CodecError> {
            codec::to_item(self)
        }

        fn from_item(item: &Item) -> std::result::Result<Self, CodecError> {
            codec::from_item(item)
        }
    }

    #[test]
    fn reserved_characters() {
        let store = Arc::new(InMemoryTableStore::new());
        let tree = tree_with(
            store.clone(),
            TreeConfig::for_table(table_name()).with_delimiter("X"),
        );

        let bad = Fields {
            ok: "fine".into(),
            reserved: Some("nope".into()),
        };
        assert!(matches!(
            tree.store(&["Accounts", "12345"], &bad),
            Err(TreeError::ReservedCharacterInAttribute { ref name }) if name == "Xfoo"
        ));
        assert!(matches!(
            tree.store(&["Accounts", "12X45"], &Fields { ok: "fine".into(), reserved: None }),
            Err(TreeError::ReservedCharacterInKey { .. })
        ));
        assert!(matches!(
            tree.link(&["AccountsXEmail", "alice"], &["Accounts", "12345"]),
            Err(TreeError::ReservedCharacterInKey { .. })
        ));
        assert!(matches!(
            tree.link(&["AccountsByEmail", "alice"], &["AccountsX", "12345"]),
            Err(TreeError::ReservedCharacterInKey { .. })
        ));
        // Nothing was written by any rejected call.
        assert_eq!(row_count(&store, &tree), 0);

        let good = Fields {
            ok: "fine".into(),
            reserved: None,
        };
        tree.store(&["Accounts", "12345"], &good).unwrap();
        let item = tree.fetch_item(&["Accounts", "12345"]).unwrap();
        assert_eq!(item["FooXBar"], AttributeValue::from("fine"));
    }

    #[test]
    fn reserved_character_in_fetch_and_list() {
        let (_store, tree) = new_tree();
        assert!(matches!(
            tree.fetch_item(&["a¦b"]),
            Err(TreeError::ReservedCharacterInKey { .. })
        ));
        let mut calls = 0;
        tree.list(&["a¦"], |entry| {
            calls += 1;
            assert!(matches!(entry, Err(TreeError::ReservedCharacterInKey { .. })));
            true
        });
        assert_eq!(calls, 1);
    }

    // ------------------------------------------------------------------
    // Codec failures
    // ------------------------------------------------------------------

    #[derive(Debug)]
    struct Frob;

    impl Storable for Frob {
        fn to_item(&self) -> std::result::Result<Item, CodecError> {
            Ok(Item::new())
        }

        fn from_item(_: &Item) -> std::result::Result<Self, CodecError> {
            Err(CodecError::custom("could not grob the frob"))
        }
    }

    #[derive(Debug)]
    struct Unserializable;

    impl Storable for Unserializable {
        fn to_item(&self) -> std::result::Result<Item, CodecError> {
            Err(CodecError::custom("refusing to serialize"))
        }

        fn from_item(_: &Item) -> std::result::Result<Self, CodecError> {
            Ok(Unserializable)
        }
    }

    #[test]
    fn deserialize_error_propagates_verbatim() {
        let (_store, tree) = new_tree();
        tree.store(&["frob"], &Frob).unwrap();
        let err = tree.fetch::<Frob, _>(&["frob"]).unwrap_err();
        assert!(matches!(err, TreeError::Codec(CodecError::Custom(_))));
        assert_eq!(err.to_string(), "could not grob the frob");
    }

    #[test]
    fn serialize_error_writes_nothing() {
        let (store, tree) = new_tree();
        assert!(matches!(
            tree.store(&["a", "b"], &Unserializable),
            Err(TreeError::Codec(_))
        ));
        assert_eq!(row_count(&store, &tree), 0);
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    #[test]
    fn link_failures() {
        let (_store, tree) = new_tree();
        tree.store(&["Accounts", "1"], &account("1")).unwrap();

        assert!(tree.link_target(&["Links", "missing"]).unwrap_err().is_not_found());
        assert!(matches!(
            tree.link_target(&["Accounts", "1"]),
            Err(TreeError::NotLink { .. })
        ));

        tree.link(&["Links", "dangling"], &["Accounts", "2"]).unwrap();
        assert!(tree.fetch_item(&["Links", "dangling"]).unwrap_err().is_not_found());
        assert_eq!(
            tree.link_target(&["Links", "dangling"]).unwrap(),
            vec!["Accounts", "2"]
        );
    }

    #[test]
    fn link_to_link_is_followed_but_target_is_immediate() {
        let (_store, tree) = new_tree();
        tree.store(&["obj"], &account("1")).unwrap();
        tree.link(&["l1"], &["obj"]).unwrap();
        tree.link(&["l2"], &["l1"]).unwrap();
        assert_eq!(tree.fetch::<Account, _>(&["l2"]).unwrap(), account("1"));
        assert_eq!(tree.link_target(&["l2"]).unwrap(), vec!["l1"]);
    }

    #[test]
    fn link_cycle_is_reported() {
        let store = Arc::new(InMemoryTableStore::new());
        let mut config = TreeConfig::for_table(table_name());
        config.max_link_hops = 4;
        let tree = tree_with(store, config);

        tree.link(&["a"], &["b"]).unwrap();
        tree.link(&["b"], &["a"]).unwrap();
        assert!(matches!(
            tree.fetch_item(&["a"]),
            Err(TreeError::TooManyRedirects { max_hops: 4, .. })
        ));
    }

    #[test]
    fn link_row_shape() {
        let (store, tree) = new_tree();
        tree.link(&["by-email", "a@b"], &["accounts", "1"]).unwrap();
        let row = store
            .get(&tree.config().table_name, &RowKey::new("¦by-email¦a@b", "¦"))
            .unwrap()
            .unwrap();
        assert_eq!(row.attributes.len(), 1);
        assert_eq!(row.attributes["¦"], AttributeValue::from("¦accounts¦1"));
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    #[test]
    fn list_is_sorted_and_excludes_grandchildren() {
        let (_store, tree) = new_tree();
        for name in ["zeta", "alpha", "Mid", "beta"] {
            tree.store(&["dir", name], &account(name)).unwrap();
        }
        tree.store(&["dir", "alpha", "deep"], &account("deep")).unwrap();
        tree.link(&["dir", "link"], &["dir", "zeta"]).unwrap();

        assert_eq!(
            tree.list_children(&["dir"]).unwrap(),
            vec!["Mid", "alpha", "beta", "link", "zeta"]
        );
        assert_eq!(tree.list_children(&["dir", "alpha"]).unwrap(), vec!["deep"]);
    }

    #[test]
    fn list_root() {
        let (_store, tree) = new_tree();
        tree.store(&["b", "x"], &account("1")).unwrap();
        tree.store(&["a"], &account("2")).unwrap();
        tree.link(&["c"], &["a"]).unwrap();
        let root: [&str; 0] = [];
        assert_eq!(tree.list_children(&root).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn list_unknown_directory_is_empty() {
        let (_store, tree) = new_tree();
        assert!(tree.list_children(&["nothing", "here"]).unwrap().is_empty());
    }

    #[test]
    fn list_paginates() {
        let store = Arc::new(InMemoryTableStore::with_config(MemoryStoreConfig {
            page_size: 3,
            ..Default::default()
        }));
        let tree = tree_with(store.clone(), TreeConfig::for_table(table_name()));
        for i in 0..10 {
            let id = format!("{i:05}");
            tree.store(&["Accounts", id.as_str()], &account("x")).unwrap();
        }
        let before = store.query_calls();
        let names = tree.list_children(&["Accounts"]).unwrap();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "00000");
        assert_eq!(names[9], "00009");
        assert_eq!(store.query_calls() - before, 4);
    }

    #[test]
    fn list_abort_stops_paging() {
        let store = Arc::new(InMemoryTableStore::with_config(MemoryStoreConfig {
            page_size: 2,
            ..Default::default()
        }));
        let tree = tree_with(store.clone(), TreeConfig::for_table(table_name()));
        for id in ["12345", "12346", "12347", "12348", "12349"] {
            tree.store(&["Accounts", id], &account(id)).unwrap();
        }

        let before = store.query_calls();
        let mut seen = Vec::new();
        tree.list(&["Accounts"], |entry| {
            let name = entry.unwrap();
            let go_on = name != "12345";
            seen.push(name);
            go_on
        });
        assert_eq!(seen, vec!["12345"]);
        assert_eq!(store.query_calls() - before, 1);
    }

    #[test]
    fn list_reports_query_failure_once() {
        let (store, tree) = new_tree();
        tree.store(&["a", "b"], &account("1")).unwrap();
        store.fail_queries(true);

        let mut results = Vec::new();
        tree.list(&["a"], |entry| {
            results.push(entry.is_err());
            true
        });
        assert_eq!(results, vec![true]);
        assert!(matches!(
            tree.list_children(&["a"]),
            Err(TreeError::Store(StoreError::Backend(_)))
        ));
    }

    #[test]
    fn list_failure_mid_pagination_stops_after_one_error() {
        let store = Arc::new(InMemoryTableStore::with_config(MemoryStoreConfig {
            page_size: 2,
            ..Default::default()
        }));
        let tree = tree_with(store.clone(), TreeConfig::for_table(table_name()));
        for id in ["a", "b", "c", "d", "e"] {
            tree.store(&["dir", id], &account(id)).unwrap();
        }
        store.fail_queries_after(1);

        let mut names = Vec::new();
        let mut errors = 0;
        tree.list(&["dir"], |entry| {
            match entry {
                Ok(name) => names.push(name),
                Err(e) => {
                    assert!(matches!(e, TreeError::Store(StoreError::Backend(_))));
                    errors += 1;
                }
            }
            true
        });
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(errors, 1);
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    #[test]
    fn delete_is_local() {
        let (store, tree) = new_tree();
        tree.store(&["p", "a"], &account("a")).unwrap();
        tree.store(&["p", "b"], &account("b")).unwrap();
        tree.store(&["q", "c"], &account("c")).unwrap();
        let before = row_count(&store, &tree);

        tree.delete(&["p", "a"]).unwrap();

        assert_eq!(row_count(&store, &tree), before - 2);
        assert_eq!(tree.list_children(&["p"]).unwrap(), vec!["b"]);
        assert_eq!(tree.list_children(&["q"]).unwrap(), vec!["c"]);
        let root: [&str; 0] = [];
        assert_eq!(tree.list_children(&root).unwrap(), vec!["p", "q"]);
    }

    #[test]
    fn delete_leaves_children_orphaned() {
        let (_store, tree) = new_tree();
        tree.store(&["dir"], &account("d")).unwrap();
        tree.store(&["dir", "child"], &account("c")).unwrap();
        tree.delete(&["dir"]).unwrap();

        let root: [&str; 0] = [];
        assert!(tree.list_children(&root).unwrap().is_empty());
        assert_eq!(tree.fetch::<Account, _>(&["dir", "child"]).unwrap(), account("c"));
        assert_eq!(tree.list_children(&["dir"]).unwrap(), vec!["child"]);
    }

    #[test]
    fn delete_missing_path_succeeds() {
        let (_store, tree) = new_tree();
        tree.delete(&["never", "stored"]).unwrap();
    }

    #[test]
    fn delete_link_keeps_target() {
        let (_store, tree) = new_tree();
        tree.store(&["obj"], &account("1")).unwrap();
        tree.link(&["l"], &["obj"]).unwrap();
        tree.delete(&["l"]).unwrap();
        assert!(tree.fetch_item(&["l"]).unwrap_err().is_not_found());
        assert_eq!(tree.fetch::<Account, _>(&["obj"]).unwrap(), account("1"));
    }

    // ------------------------------------------------------------------
    // Depth, batching and partial failure
    // ------------------------------------------------------------------

    #[test]
    fn long_path() {
        let (store, tree) = new_tree();
        let path: Vec<String> = (0..50).map(|_| "X".to_string()).collect();
        let link: Vec<String> = (0..50).map(|_| "L".to_string()).collect();

        tree.store(&path, &account("deep")).unwrap();
        tree.store(&["foo"], &account("foo")).unwrap();
        tree.link(&link, &["foo"]).unwrap();

        assert_eq!(tree.fetch::<Account, _>(&path).unwrap(), account("deep"));
        assert_eq!(tree.fetch::<Account, _>(&link).unwrap(), account("foo"));
        assert_eq!(tree.link_target(&link).unwrap(), vec!["foo"]);

        tree.delete(&path).unwrap();
        tree.delete(&link).unwrap();
        assert!(tree.fetch_item(&path).unwrap_err().is_not_found());
        assert!(tree.fetch_item(&link).unwrap_err().is_not_found());
        // 49 ancestor edges per deep path, plus foo's edge and object.
        assert_eq!(row_count(&store, &tree), 49 + 49 + 2);
    }

    #[test]
    fn throttled_store_still_completes() {
        let (store, tree) = new_tree();
        store.throttle_batches(5);
        let path: Vec<String> = (0..30).map(|i| format!("p{i}")).collect();
        tree.store(&path, &account("1")).unwrap();
        assert_eq!(tree.fetch::<Account, _>(&path).unwrap(), account("1"));
        assert_eq!(row_count(&store, &tree), 31);
    }

    #[test]
    fn exhausted_retries_surface() {
        let store = Arc::new(InMemoryTableStore::new());
        let tree = Tree::new(
            store.clone(),
            TreeConfig::for_table(table_name()).with_retry(RetryPolicy {
                max_attempts: Some(1),
                ..RetryPolicy::immediate()
            }),
        )
        .unwrap();
        tree.create_table().unwrap();

        store.throttle_batches(10);
        assert!(matches!(
            tree.store(&["a"], &account("1")),
            Err(TreeError::RetriesExhausted { .. })
        ));
    }

    #[test]
    fn failed_multi_chunk_write_leaves_torn_state() {
        let (store, tree) = new_tree();
        let path: Vec<String> = (0..40).map(|i| format!("d{i}")).collect();
        store.fail_batch_after(1);

        let err = tree.store(&path, &account("1")).unwrap_err();
        assert!(matches!(err, TreeError::Store(StoreError::Backend(_))));

        // The first chunk of edges landed; the object row never did.
        assert_eq!(row_count(&store, &tree), 25);
        assert!(tree.fetch_item(&path).unwrap_err().is_not_found());
        assert_eq!(tree.list_children(&path[..1]).unwrap(), vec!["d1"]);
    }

    // ------------------------------------------------------------------
    // Construction and table setup
    // ------------------------------------------------------------------

    #[test]
    fn double_create_table() {
        let (_store, tree) = new_tree();
        tree.create_table().unwrap();
        tree.create_table().unwrap();
    }

    #[test]
    fn missing_table_is_a_store_error() {
        let store = Arc::new(InMemoryTableStore::new());
        let tree = Tree::new(store, TreeConfig::for_table(table_name())).unwrap();
        assert!(matches!(
            tree.fetch_item(&["a"]),
            Err(TreeError::Store(StoreError::TableNotFound(_)))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = TreeConfig::for_table(table_name());
        config.max_batch_items = 100;
        assert!(matches!(
            Tree::new(InMemoryTableStore::new(), config),
            Err(TreeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn self_overlapping_delimiter_is_rejected() {
        let config = TreeConfig::for_table(table_name()).with_delimiter("aa");
        assert!(matches!(
            Tree::new(InMemoryTableStore::new(), config),
            Err(TreeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn paths_sharing_delimiter_letters_stay_distinct() {
        let store = Arc::new(InMemoryTableStore::new());
        let tree = tree_with(store, TreeConfig::for_table(table_name()).with_delimiter("a"));
        let value = |v: &str| {
            let mut item = Item::new();
            item.insert("v".into(), AttributeValue::from(v));
            item
        };
        assert!(matches!(
            tree.store(&["xa", "y"], &value("1")),
            Err(TreeError::ReservedCharacterInKey { .. })
        ));
        tree.store(&["x", "y"], &value("1")).unwrap();
        tree.store(&["xy"], &value("2")).unwrap();
        assert_eq!(tree.fetch_item(&["x", "y"]).unwrap(), value("1"));
        assert_eq!(tree.fetch_item(&["xy"]).unwrap(), value("2"));
        assert_eq!(tree.list_children::<&str>(&[]).unwrap(), vec!["x", "xy"]);
    }

    #[test]
    fn huge_retry_multiplier_does_not_panic() {
        let config = TreeConfig::from_toml_str(&format!(
            "table_name = \"{}\"\n[retry]\ninitial_backoff_ms = 1\nmax_backoff_ms = 2\nmultiplier = 1e300\n",
            table_name()
        ))
        .unwrap();
        let store = Arc::new(InMemoryTableStore::new());
        let tree = Tree::new(store.clone(), config).unwrap();
        tree.create_table().unwrap();

        store.throttle_batches(3);
        tree.store(&["a", "b", "c"], &account("1")).unwrap();
        assert_eq!(tree.fetch::<Account, _>(&["a", "b", "c"]).unwrap(), account("1"));
    }

    #[test]
    fn nan_retry_multiplier_is_rejected() {
        let config = TreeConfig::from_toml_str("[retry]\nmultiplier = nan\n").unwrap();
        assert!(matches!(
            Tree::new(InMemoryTableStore::new(), config),
            Err(TreeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_delimiter_uses_default() {
        let tree = Tree::new(
            InMemoryTableStore::new(),
            TreeConfig::for_table(table_name()).with_delimiter(""),
        )
        .unwrap();
        assert_eq!(tree.codec().delimiter(), "¦");
    }

    #[test]
    fn trees_on_separate_tables_are_isolated() {
        let store = Arc::new(InMemoryTableStore::new());
        let one = tree_with(store.clone(), TreeConfig::for_table(table_name()));
        let two = tree_with(store, TreeConfig::for_table(table_name()));
        one.store(&["a"], &account("1")).unwrap();
        assert!(two.fetch_item(&["a"]).unwrap_err().is_not_found());
    }

    #[test]
    fn file_backed_tree_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let table = table_name();
        {
            let store = FileTableStore::open(&path).unwrap();
            let tree = Tree::new(store, TreeConfig::for_table(table.clone())).unwrap();
            tree.create_table().unwrap();
            tree.store(&["Accounts", "1"], &account("1")).unwrap();
            tree.link(&["ByEmail", "1@example.com"], &["Accounts", "1"]).unwrap();
        }
        let tree = Tree::new(FileTableStore::open(&path).unwrap(), TreeConfig::for_table(table)).unwrap();
        tree.create_table().unwrap();
        assert_eq!(
            tree.fetch::<Account, _>(&["ByEmail", "1@example.com"]).unwrap(),
            account("1")
        );
    }

    fn component() -> impl Strategy<Value = String> {
        "[a-z0-9@.]{1,6}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn store_then_fetch_round_trips(
            path in prop::collection::vec(component(), 1..6),
            email in "[a-z]{1,10}",
            logins in any::<u32>(),
        ) {
            let (_store, tree) = new_tree();
            let value = Account { id: path.join("/"), email, logins };
            tree.store(&path, &value).unwrap();
            prop_assert_eq!(tree.fetch::<Account, _>(&path).unwrap(), value.clone());

            let link = vec!["links".to_string(), "l".to_string()];
            tree.link(&link, &path).unwrap();
            prop_assert_eq!(tree.fetch::<Account, _>(&link).unwrap(), value);
            prop_assert_eq!(tree.link_target(&link).unwrap(), path.clone());

            let parent = &path[..path.len() - 1];
            let children = tree.list_children(parent).unwrap();
            prop_assert!(children.contains(&path[path.len() - 1]));
        }
    }
}
