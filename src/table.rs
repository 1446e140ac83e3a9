// Table façade: binds the pager to the tree rooted at page 0 and exposes
// the operations the prompt needs.

use std::path::Path;

use crate::btree::{self, ROOT_PAGE_NUM};
use crate::cursor::Cursor;
use crate::error::{DbError, Result};
use crate::node::{self, leaf, NodeType};
use crate::pager::Pager;
use crate::row::Row;

pub struct Table {
    pager: Pager,
    root_page_num: u32,
}

impl Table {
    /// Open a database file, creating it if absent. A zero-length file gets
    /// page 0 initialized as an empty root leaf.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_pager(Pager::open(path)?)
    }

    /// Like [`Table::open`], with the sidecar page journal enabled: flushes
    /// write page images to the journal before touching the database file.
    pub fn open_journaled<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_pager(Pager::open_journaled(path)?)
    }

    fn from_pager(mut pager: Pager) -> Result<Self> {
        if pager.num_pages() == 0 {
            let root = pager.get_page_mut(ROOT_PAGE_NUM)?;
            leaf::init(&mut root.data);
            node::set_root(&mut root.data, true);
        }
        Ok(Self {
            pager,
            root_page_num: ROOT_PAGE_NUM,
        })
    }

    pub fn pager_mut(&mut self) -> &mut Pager {
        &mut self.pager
    }

    /// Cursor at the position `key` occupies, or would occupy if inserted.
    /// Always lands in a leaf.
    pub fn find(&mut self, key: u32) -> Result<Cursor> {
        let root_type = node::node_type(&self.pager.get_page(self.root_page_num)?.data)?;
        match root_type {
            NodeType::Leaf => btree::leaf_find(&mut self.pager, self.root_page_num, key),
            NodeType::Internal => btree::internal_find(&mut self.pager, self.root_page_num, key),
        }
    }

    /// Cursor at the first row in key order. Every binary-search step sends
    /// key 0 to the left, so this lands in the leftmost leaf.
    pub fn start(&mut self) -> Result<Cursor> {
        let mut cursor = self.find(0)?;
        let page = self.pager.get_page(cursor.page_num)?;
        cursor.end_of_table = leaf::num_cells(&page.data) == 0;
        Ok(cursor)
    }

    /// Insert a row keyed by its id. A row with the same id already in the
    /// tree rejects the insert without mutating anything.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        let cursor = self.find(row.id)?;

        let page = self.pager.get_page(cursor.page_num)?;
        let num_cells = leaf::num_cells(&page.data);
        if cursor.cell_num < num_cells && leaf::key(&page.data, cursor.cell_num) == row.id {
            return Err(DbError::DuplicateKey);
        }

        btree::leaf_insert(&mut self.pager, &cursor, row.id, row)
    }

    /// Every row in ascending key order, walking the leaf sibling chain.
    pub fn select(&mut self) -> Result<Vec<Row>> {
        let mut cursor = self.start()?;
        let mut rows = Vec::new();
        while !cursor.end_of_table {
            rows.push(Row::deserialize(cursor.value(&mut self.pager)?));
            cursor.advance(&mut self.pager)?;
        }
        Ok(rows)
    }

    /// Render the tree for the `.btree` meta-command.
    pub fn format_tree(&mut self) -> Result<String> {
        let mut out = String::new();
        btree::format_tree(&mut self.pager, self.root_page_num, 0, &mut out)?;
        Ok(out)
    }

    /// Write every resident page back to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.pager.flush_all()
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        // Destructors cannot propagate; a failed close-time flush is
        // reported and the process moves on.
        if let Err(e) = self.pager.flush_all() {
            eprintln!("Error flushing database on close: {e}");
        }
    }
}
