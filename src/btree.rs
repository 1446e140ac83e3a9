// B+tree operations over pager-owned pages.
//
// Functions here take the pager plus page numbers rather than node
// references: parent links are page numbers resolved through the pager on
// every traversal, which keeps the on-disk representation and the in-memory
// representation identical. Steps that rewrite several pages at once copy
// the source page's bytes first; the pager never evicts, so page numbers
// and buffers stay stable for the whole operation.

use std::fmt::Write;

use crate::cursor::Cursor;
use crate::error::{DbError, Result};
use crate::node::{self, internal, leaf, NodeType, INVALID_PAGE_NUM};
use crate::pager::{Pager, PAGE_SIZE};
use crate::row::Row;

/// The root always lives on page 0.
pub const ROOT_PAGE_NUM: u32 = 0;

/// Binary search within a leaf. Returns a cursor at the matching cell, or
/// at the first cell whose key is greater (the insertion position).
pub fn leaf_find(pager: &mut Pager, page_num: u32, key: u32) -> Result<Cursor> {
    let page = pager.get_page(page_num)?;
    let num_cells = leaf::num_cells(&page.data);

    let mut min_index = 0;
    let mut one_past_max_index = num_cells;
    while min_index != one_past_max_index {
        let index = (min_index + one_past_max_index) / 2;
        let key_at_index = leaf::key(&page.data, index);
        if key == key_at_index {
            return Ok(Cursor {
                page_num,
                cell_num: index,
                end_of_table: false,
            });
        }
        if key < key_at_index {
            one_past_max_index = index;
        } else {
            min_index = index + 1;
        }
    }

    Ok(Cursor {
        page_num,
        cell_num: min_index,
        end_of_table: false,
    })
}

/// Index of the child whose subtree should contain `key`: the first
/// separator that is >= `key`, or the right-child position past them all.
pub fn find_child(page: &[u8], key: u32) -> u32 {
    let num_keys = internal::num_keys(page);

    let mut min_index = 0;
    let mut max_index = num_keys; // one more child than keys
    while min_index != max_index {
        let index = (min_index + max_index) / 2;
        if internal::key(page, index) >= key {
            max_index = index;
        } else {
            min_index = index + 1;
        }
    }
    min_index
}

/// Descend from an internal node to the leaf that should contain `key`.
pub fn internal_find(pager: &mut Pager, page_num: u32, key: u32) -> Result<Cursor> {
    let child_page_num = {
        let page = pager.get_page(page_num)?;
        let child_index = find_child(&page.data, key);
        internal::child(&page.data, child_index)?
    };

    let child_type = node::node_type(&pager.get_page(child_page_num)?.data)?;
    match child_type {
        NodeType::Leaf => leaf_find(pager, child_page_num, key),
        NodeType::Internal => internal_find(pager, child_page_num, key),
    }
}

/// Replace the separator that covered `old_key` with `new_key`.
pub fn update_internal_key(page: &mut [u8], old_key: u32, new_key: u32) {
    let old_child_index = find_child(page, old_key);
    internal::set_key(page, old_child_index, new_key);
}

/// Maximum key anywhere in the subtree rooted at `page_num`, resolved
/// through the pager by descending right children to the rightmost leaf.
pub fn tree_max_key(pager: &mut Pager, page_num: u32) -> Result<u32> {
    let right_child = {
        let page = pager.get_page(page_num)?;
        match node::node_type(&page.data)? {
            NodeType::Leaf => return node::max_key(&page.data),
            NodeType::Internal => internal::right_child(&page.data),
        }
    };
    if right_child == INVALID_PAGE_NUM {
        return Err(DbError::Corrupt(
            "max key of an internal node with no right child".into(),
        ));
    }
    tree_max_key(pager, right_child)
}

/// Insert a key/row pair at the cursor's position, splitting the leaf if
/// it is already full.
pub fn leaf_insert(pager: &mut Pager, cursor: &Cursor, key: u32, row: &Row) -> Result<()> {
    let num_cells = {
        let page = pager.get_page(cursor.page_num)?;
        leaf::num_cells(&page.data)
    };
    if num_cells >= leaf::MAX_CELLS as u32 {
        return leaf_split_and_insert(pager, cursor, key, row);
    }

    let page = pager.get_page_mut(cursor.page_num)?;
    if cursor.cell_num < num_cells {
        leaf::shift_cells_right(&mut page.data, cursor.cell_num, num_cells);
    }
    leaf::set_num_cells(&mut page.data, num_cells + 1);
    leaf::set_key(&mut page.data, cursor.cell_num, key);
    row.serialize(leaf::value_mut(&mut page.data, cursor.cell_num));
    Ok(())
}

/// Write entry `i` of the conceptual post-insert sequence into a
/// destination slot: the incoming entry at the cursor position, otherwise
/// an existing cell with the gap accounted for.
fn place_split_entry(
    dest: &mut [u8],
    index_within_node: u32,
    i: u32,
    cursor_cell: u32,
    key: u32,
    row: &Row,
    old_data: &[u8; PAGE_SIZE],
) {
    if i == cursor_cell {
        leaf::set_key(dest, index_within_node, key);
        row.serialize(leaf::value_mut(dest, index_within_node));
    } else if i > cursor_cell {
        leaf::set_cell(dest, index_within_node, leaf::cell(old_data, i - 1));
    } else {
        leaf::set_cell(dest, index_within_node, leaf::cell(old_data, i));
    }
}

/// Split a full leaf and insert the pending entry. The MAX_CELLS + 1
/// conceptual entries are divided between the old (left) and a fresh
/// (right) leaf; the parent is then fixed up, or a new root created when
/// the old leaf was the root.
fn leaf_split_and_insert(pager: &mut Pager, cursor: &Cursor, key: u32, row: &Row) -> Result<()> {
    let old_page_num = cursor.page_num;
    let (old_data, old_max) = {
        let page = pager.get_page(old_page_num)?;
        (page.data, node::max_key(&page.data)?)
    };
    let old_was_root = node::is_root(&old_data);

    let new_page_num = pager.unused_page_num();
    {
        let new_page = pager.get_page_mut(new_page_num)?;
        leaf::init(&mut new_page.data);
        node::set_parent(&mut new_page.data, node::parent(&old_data));
        // Splice into the sibling chain ahead of the old leaf's successor.
        leaf::set_next_leaf(&mut new_page.data, leaf::next_leaf(&old_data));

        for i in (leaf::LEFT_SPLIT_COUNT as u32..=leaf::MAX_CELLS as u32).rev() {
            let index_within_node = i % leaf::LEFT_SPLIT_COUNT as u32;
            place_split_entry(
                &mut new_page.data,
                index_within_node,
                i,
                cursor.cell_num,
                key,
                row,
                &old_data,
            );
        }
        leaf::set_num_cells(&mut new_page.data, leaf::RIGHT_SPLIT_COUNT as u32);
    }

    {
        let old_page = pager.get_page_mut(old_page_num)?;
        for i in (0..leaf::LEFT_SPLIT_COUNT as u32).rev() {
            place_split_entry(
                &mut old_page.data,
                i,
                i,
                cursor.cell_num,
                key,
                row,
                &old_data,
            );
        }
        leaf::set_num_cells(&mut old_page.data, leaf::LEFT_SPLIT_COUNT as u32);
        leaf::set_next_leaf(&mut old_page.data, new_page_num);
    }

    if old_was_root {
        create_new_root(pager, new_page_num)
    } else {
        let parent_page_num = node::parent(&old_data);
        let new_max = node::max_key(&pager.get_page(old_page_num)?.data)?;
        {
            let parent = pager.get_page_mut(parent_page_num)?;
            update_internal_key(&mut parent.data, old_max, new_max);
        }
        internal_insert(pager, parent_page_num, new_page_num)
    }
}

/// Add a child/key pair to `parent` that corresponds to `child`.
pub fn internal_insert(pager: &mut Pager, parent_page_num: u32, child_page_num: u32) -> Result<()> {
    let child_max = tree_max_key(pager, child_page_num)?;
    let (index, original_num_keys, right_child_page_num) = {
        let parent = pager.get_page(parent_page_num)?;
        (
            find_child(&parent.data, child_max),
            internal::num_keys(&parent.data),
            internal::right_child(&parent.data),
        )
    };

    if original_num_keys >= internal::MAX_KEYS as u32 {
        return internal_split_and_insert(pager, parent_page_num, child_page_num);
    }

    // An internal node whose right child is invalid is empty.
    if right_child_page_num == INVALID_PAGE_NUM {
        let parent = pager.get_page_mut(parent_page_num)?;
        internal::set_right_child(&mut parent.data, child_page_num);
        return Ok(());
    }

    let right_child_max = tree_max_key(pager, right_child_page_num)?;
    let parent = pager.get_page_mut(parent_page_num)?;
    internal::set_num_keys(&mut parent.data, original_num_keys + 1);

    if child_max > right_child_max {
        // The new child becomes the right child; the old right child moves
        // into the last cell.
        internal::set_child(&mut parent.data, original_num_keys, right_child_page_num);
        internal::set_key(&mut parent.data, original_num_keys, right_child_max);
        internal::set_right_child(&mut parent.data, child_page_num);
    } else {
        internal::shift_cells_right(&mut parent.data, index, original_num_keys);
        internal::set_child(&mut parent.data, index, child_page_num);
        internal::set_key(&mut parent.data, index, child_max);
    }
    Ok(())
}

/// Split an overfull internal node while adding `child`. When the node
/// being split is the root, the new root is created first and the old
/// node's contents continue life as the root's left child.
fn internal_split_and_insert(
    pager: &mut Pager,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<()> {
    let mut old_page_num = parent_page_num;
    let old_max = tree_max_key(pager, old_page_num)?;
    let child_max = tree_max_key(pager, child_page_num)?;
    let new_page_num = pager.unused_page_num();

    let splitting_root = node::is_root(&pager.get_page(old_page_num)?.data);
    let parent_of_old = if splitting_root {
        create_new_root(pager, new_page_num)?;
        // The old node's data now lives in the new root's left child.
        old_page_num = internal::child(&pager.get_page(ROOT_PAGE_NUM)?.data, 0)?;
        ROOT_PAGE_NUM
    } else {
        let parent_of_old = node::parent(&pager.get_page(old_page_num)?.data);
        let new_page = pager.get_page_mut(new_page_num)?;
        internal::init(&mut new_page.data);
        parent_of_old
    };

    // Move the old right child over first and invalidate it, so that the
    // transfers below can promote a cell child into its place.
    let moved_page_num = internal::right_child(&pager.get_page(old_page_num)?.data);
    internal_insert(pager, new_page_num, moved_page_num)?;
    node::set_parent(&mut pager.get_page_mut(moved_page_num)?.data, new_page_num);
    internal::set_right_child(&mut pager.get_page_mut(old_page_num)?.data, INVALID_PAGE_NUM);

    // Transfer cells above the middle key into the new node.
    let max_keys = internal::MAX_KEYS as u32;
    for i in ((max_keys / 2 + 1)..max_keys).rev() {
        let moved_page_num = internal::child(&pager.get_page(old_page_num)?.data, i)?;
        internal_insert(pager, new_page_num, moved_page_num)?;
        node::set_parent(&mut pager.get_page_mut(moved_page_num)?.data, new_page_num);

        let old_page = pager.get_page_mut(old_page_num)?;
        let n = internal::num_keys(&old_page.data);
        internal::set_num_keys(&mut old_page.data, n - 1);
    }

    // The child just below the middle key is now the highest; promote it
    // to be the old node's right child.
    {
        let old_page = pager.get_page_mut(old_page_num)?;
        let n = internal::num_keys(&old_page.data);
        let promoted = internal::child(&old_page.data, n - 1)?;
        internal::set_right_child(&mut old_page.data, promoted);
        internal::set_num_keys(&mut old_page.data, n - 1);
    }

    // The pending child lands in whichever half covers its key range.
    let max_after_split = tree_max_key(pager, old_page_num)?;
    let destination_page_num = if child_max < max_after_split {
        old_page_num
    } else {
        new_page_num
    };
    internal_insert(pager, destination_page_num, child_page_num)?;
    node::set_parent(
        &mut pager.get_page_mut(child_page_num)?.data,
        destination_page_num,
    );

    let old_new_max = tree_max_key(pager, old_page_num)?;
    {
        let parent = pager.get_page_mut(parent_of_old)?;
        update_internal_key(&mut parent.data, old_max, old_new_max);
    }

    if !splitting_root {
        let old_parent = node::parent(&pager.get_page(old_page_num)?.data);
        internal_insert(pager, old_parent, new_page_num)?;
        node::set_parent(&mut pager.get_page_mut(new_page_num)?.data, old_parent);
    }
    Ok(())
}

/// Handle a root split: copy the root into a fresh left page, keep the
/// passed-in page as the right child, and reinitialize page 0 as an
/// internal node over the two.
pub fn create_new_root(pager: &mut Pager, right_child_page_num: u32) -> Result<()> {
    let root_is_internal = {
        let root = pager.get_page(ROOT_PAGE_NUM)?;
        node::node_type(&root.data)? == NodeType::Internal
    };

    // Touch the right child before allocating the left page so the left
    // page number lands past it. An internal right child gets sane header
    // bytes before any accessor reads it.
    {
        let right_child = pager.get_page_mut(right_child_page_num)?;
        if root_is_internal {
            internal::init(&mut right_child.data);
        }
    }

    let left_child_page_num = pager.unused_page_num();
    let root_data = pager.get_page(ROOT_PAGE_NUM)?.data;
    {
        let left_child = pager.get_page_mut(left_child_page_num)?;
        if root_is_internal {
            internal::init(&mut left_child.data);
        }
        left_child.data = root_data;
        node::set_root(&mut left_child.data, false);
        node::set_parent(&mut left_child.data, ROOT_PAGE_NUM);
    }

    // The old root's children now hang off the left page.
    if root_is_internal {
        let mut children = Vec::new();
        {
            let left_child = pager.get_page(left_child_page_num)?;
            for i in 0..=internal::num_keys(&left_child.data) {
                children.push(internal::child(&left_child.data, i)?);
            }
        }
        for child_page_num in children {
            let child = pager.get_page_mut(child_page_num)?;
            node::set_parent(&mut child.data, left_child_page_num);
        }
    }

    let left_child_max = tree_max_key(pager, left_child_page_num)?;
    {
        let root = pager.get_page_mut(ROOT_PAGE_NUM)?;
        root.data = [0u8; PAGE_SIZE];
        internal::init(&mut root.data);
        node::set_root(&mut root.data, true);
        internal::set_num_keys(&mut root.data, 1);
        internal::set_child(&mut root.data, 0, left_child_page_num);
        internal::set_key(&mut root.data, 0, left_child_max);
        internal::set_right_child(&mut root.data, right_child_page_num);
    }
    {
        let right_child = pager.get_page_mut(right_child_page_num)?;
        node::set_parent(&mut right_child.data, ROOT_PAGE_NUM);
    }
    Ok(())
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

/// Render the subtree rooted at `page_num`, two spaces of indentation per
/// level, in the shape the `.btree` meta-command prints.
pub fn format_tree(pager: &mut Pager, page_num: u32, level: usize, out: &mut String) -> Result<()> {
    let data = pager.get_page(page_num)?.data;
    match node::node_type(&data)? {
        NodeType::Leaf => {
            let num_cells = leaf::num_cells(&data);
            indent(out, level);
            let _ = writeln!(out, "- leaf (size {num_cells})");
            for i in 0..num_cells {
                indent(out, level + 1);
                let _ = writeln!(out, "- {}", leaf::key(&data, i));
            }
        }
        NodeType::Internal => {
            let num_keys = internal::num_keys(&data);
            indent(out, level);
            let _ = writeln!(out, "- internal (size {num_keys})");
            if num_keys > 0 {
                for i in 0..num_keys {
                    format_tree(pager, internal::child(&data, i)?, level + 1, out)?;
                    indent(out, level + 1);
                    let _ = writeln!(out, "- key {}", internal::key(&data, i));
                }
                format_tree(pager, internal::right_child(&data), level + 1, out)?;
            }
        }
    }
    Ok(())
}
