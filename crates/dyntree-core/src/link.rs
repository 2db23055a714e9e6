//! Link resolution.
//!
//! A fetch that lands on a link row is redirected to the link's target.
//! Redirects run in a loop capped at `max_hops`, so a cycle of links ends
//! in [`TreeError::TooManyRedirects`] instead of spinning forever.

use tracing::trace;

use dyntree_store::{Item, Row, TableStore};

use crate::error::{Result, TreeError};
use crate::path::PathCodec;

/// What an object row holds.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// Application attributes.
    Object(Item),
    /// Target path of a link.
    Link(Vec<String>),
}

/// Row reads plus link classification for one table.
pub struct LinkResolver<'a, S: TableStore + ?Sized> {
    store: &'a S,
    table: &'a str,
    codec: &'a PathCodec,
    max_hops: usize,
}

impl<'a, S: TableStore + ?Sized> LinkResolver<'a, S> {
    pub fn new(store: &'a S, table: &'a str, codec: &'a PathCodec, max_hops: usize) -> Self {
        Self {
            store,
            table,
            codec,
            max_hops,
        }
    }

    /// Read and classify the object row at `path`, without following links.
    pub fn entry<P: AsRef<str>>(&self, path: &[P]) -> Result<Entry> {
        let key = self.codec.object_key(path);
        let row = self
            .store
            .get(self.table, &key)?
            .ok_or_else(|| TreeError::NotFound {
                path: PathCodec::display(path),
            })?;
        self.classify(path, row)
    }

    /// Follow links from `path` until an ordinary object is reached.
    ///
    /// Returns the object's attributes and the path they were read from.
    pub fn resolve<P: AsRef<str>>(&self, path: &[P]) -> Result<(Vec<String>, Item)> {
        let mut current: Vec<String> = path.iter().map(|c| c.as_ref().to_string()).collect();
        let mut hops = 0;
        loop {
            match self.entry(current.as_slice())? {
                Entry::Object(item) => return Ok((current, item)),
                Entry::Link(target) => {
                    if hops == self.max_hops {
                        return Err(TreeError::TooManyRedirects {
                            path: PathCodec::display(path),
                            max_hops: self.max_hops,
                        });
                    }
                    hops += 1;
                    trace!(
                        from = %PathCodec::display(&current),
                        to = %PathCodec::display(&target),
                        hops,
                        "following link"
                    );
                    current = target;
                }
            }
        }
    }

    /// Immediate target of the link at `path`. Chains are not followed.
    pub fn target<P: AsRef<str>>(&self, path: &[P]) -> Result<Vec<String>> {
        match self.entry(path)? {
            Entry::Link(target) => Ok(target),
            Entry::Object(_) => Err(TreeError::NotLink {
                path: PathCodec::display(path),
            }),
        }
    }

    fn classify<P: AsRef<str>>(&self, path: &[P], row: Row) -> Result<Entry> {
        match self.codec.link_target_of(&row) {
            None => Ok(Entry::Object(row.attributes)),
            Some(Some(target)) => Ok(Entry::Link(target)),
            Some(None) => Err(TreeError::CorruptLink {
                path: PathCodec::display(path),
            }),
        }
    }
}
