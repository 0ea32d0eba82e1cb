use crate::buffer::PageId;
use crate::error::ChalkDBResult;
use crate::index::btree_index::BTreeIndex;
use crate::index::key::IndexKey;
use crate::storage::codec::{InteriorPageCodec, LeafPageCodec};
use crate::storage::page::index_page::{InteriorPage, LeafPage};
use comfy_table::{Cell, Table};
use std::fmt::Write;

/// Render the tree level by level for debugging and tests.
pub fn pretty_format_index_tree<K: IndexKey>(index: &mut BTreeIndex<K>) -> ChalkDBResult<String> {
    let mut display = String::new();
    let root_id = index.root_page_id();
    let height = read_interior(index, root_id)?.level;

    let mut current: Vec<PageId> = vec![root_id];
    let mut level_no = 1;
    for _ in 0..height {
        let mut table = Table::new();
        let mut cells = Vec::new();
        let mut next = Vec::new();
        for &page_id in &current {
            let node: InteriorPage<K> = read_interior(index, page_id)?;
            let keys = node
                .keys
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            cells.push(Cell::new(format!(
                "page_id={}, level={}, size: {}/{}\n[{}]",
                page_id,
                node.level,
                node.occupancy(),
                InteriorPage::<K>::capacity(),
                keys
            )));
            next.extend(node.children.iter().copied());
        }
        table.add_row(cells);
        writeln!(display, "B+ Tree Level No.{}:", level_no).unwrap();
        writeln!(display, "{}", table).unwrap();
        level_no += 1;
        current = next;
        if current.is_empty() {
            return Ok(display);
        }
    }

    let mut table = Table::new();
    let mut cells = Vec::new();
    for &page_id in &current {
        let leaf: LeafPage<K> = read_leaf(index, page_id)?;
        let keys = leaf
            .keys
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        cells.push(Cell::new(format!(
            "page_id={}, size: {}/{}, next_page_id={}\n[{}]",
            page_id,
            leaf.occupancy(),
            LeafPage::<K>::capacity(),
            leaf.right_sibling,
            keys
        )));
    }
    table.add_row(cells);
    writeln!(display, "B+ Tree Level No.{}:", level_no).unwrap();
    writeln!(display, "{}", table).unwrap();
    Ok(display)
}

fn read_interior<K: IndexKey>(
    index: &mut BTreeIndex<K>,
    page_id: PageId,
) -> ChalkDBResult<InteriorPage<K>> {
    let page = index.buffer_pool.fetch_page(page_id)?;
    let decoded = InteriorPageCodec::decode::<K>(page.data());
    index.buffer_pool.unpin_page(page_id, false)?;
    Ok(decoded?.0)
}

fn read_leaf<K: IndexKey>(
    index: &mut BTreeIndex<K>,
    page_id: PageId,
) -> ChalkDBResult<LeafPage<K>> {
    let page = index.buffer_pool.fetch_page(page_id)?;
    let decoded = LeafPageCodec::decode::<K>(page.data());
    index.buffer_pool.unpin_page(page_id, false)?;
    Ok(decoded?.0)
}
