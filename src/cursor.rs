use crate::error::Result;
use crate::node::leaf;
use crate::pager::Pager;

/// A position in the table: a leaf page plus a cell index within it.
/// Doubles as an insertion point (where a key would go) and as a scan
/// iterator over the leaf sibling chain.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl Cursor {
    /// Byte range of the current cell's row.
    pub fn value<'p>(&self, pager: &'p mut Pager) -> Result<&'p [u8]> {
        let page = pager.get_page(self.page_num)?;
        Ok(leaf::value(&page.data, self.cell_num))
    }

    /// Move to the next cell, following the sibling pointer when the
    /// current leaf is exhausted. A next-leaf of 0 marks the rightmost
    /// leaf and ends the scan.
    pub fn advance(&mut self, pager: &mut Pager) -> Result<()> {
        let page = pager.get_page(self.page_num)?;
        self.cell_num += 1;
        if self.cell_num >= leaf::num_cells(&page.data) {
            let next_page_num = leaf::next_leaf(&page.data);
            if next_page_num == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next_page_num;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}
