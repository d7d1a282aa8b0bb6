//! Shaping Textract responses into a document object model.
//!
//! Textract returns a flat list of blocks linked by id. This module resolves
//! those links into the structure callers actually want: pages containing
//! lines of words, tables of cells, and key-value pairs.

pub mod response;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::prelude::*;

use self::response::{Block, TextractResponse};

/// A parsed document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Document {
    pub pages: Vec<Page>,
}

/// One page of a document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Page {
    pub lines: Vec<Line>,
    pub tables: Vec<Table>,
    pub key_values: Vec<KeyValue>,
}

/// A line of text.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Line {
    pub text: String,
    pub words: Vec<Word>,
}

/// A single word.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Word {
    pub text: String,
    pub confidence: Option<f32>,
}

/// A table, as a sparse list of cells.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Table {
    pub row_count: u32,
    pub column_count: u32,
    pub cells: Vec<TableCell>,
}

/// One table cell. Row and column indices are 1-based, as in the service's
/// responses.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TableCell {
    pub row: u32,
    pub column: u32,
    pub row_span: u32,
    pub column_span: u32,
    pub text: String,
}

/// A key-value pair from form extraction.
#[derive(Clone, Debug, Default, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl Document {
    /// Build a document from a response's blocks.
    pub fn from_response(response: &TextractResponse) -> Result<Document> {
        DocumentBuilder::new(response).build()
    }

    /// All text in the document, pages separated by blank lines.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(Page::text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Page {
    /// All text on the page, one line per line block.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builder state: the response's blocks, indexed by id.
struct DocumentBuilder<'a> {
    blocks: &'a [Block],
    blocks_by_id: HashMap<&'a str, &'a Block>,
}

impl<'a> DocumentBuilder<'a> {
    fn new(response: &'a TextractResponse) -> Self {
        let mut blocks_by_id = HashMap::new();
        for block in &response.blocks {
            // Blocks without an id can't be linked to, so they can't
            // contribute to the model.
            if let Some(id) = block.id.as_deref() {
                blocks_by_id.insert(id, block);
            }
        }
        Self {
            blocks: &response.blocks,
            blocks_by_id,
        }
    }

    fn build(&self) -> Result<Document> {
        let mut pages = Vec::new();
        let mut attached: HashSet<&str> = HashSet::new();

        for block in self.blocks_of_type("PAGE") {
            let mut page = Page::default();
            for id in block.related_ids("CHILD") {
                let child = self.resolve(id)?;
                attached.insert(id);
                match child.block_type.as_deref() {
                    Some("LINE") => page.lines.push(self.build_line(child)?),
                    Some("TABLE") => page.tables.push(self.build_table(child)?),
                    Some("KEY_VALUE_SET") if is_key_block(child) => {
                        page.key_values.push(self.build_key_value(child)?);
                    }
                    // WORD, CELL, SELECTION_ELEMENT and the rest are reached
                    // through their parents.
                    _ => {}
                }
            }
            pages.push(page);
        }

        // Sync text detection has no pages-without-PAGE case, but keep
        // degenerate inputs usable: treat every line as one implicit page.
        if pages.is_empty() && self.blocks_of_type("LINE").next().is_some() {
            let mut page = Page::default();
            for line in self.blocks_of_type("LINE") {
                if let Some(id) = line.id.as_deref() {
                    attached.insert(id);
                }
                page.lines.push(self.build_line(line)?);
            }
            pages.push(page);
        }

        // Some responses only link tables and key-value sets to their page by
        // page number. Attach whatever the PAGE blocks didn't claim.
        for block in self.blocks {
            let Some(id) = block.id.as_deref() else {
                continue;
            };
            if attached.contains(id) || pages.is_empty() {
                continue;
            }
            let page_idx = (block.page.unwrap_or(1).max(1) as usize - 1).min(pages.len() - 1);
            match block.block_type.as_deref() {
                Some("TABLE") => pages[page_idx].tables.push(self.build_table(block)?),
                Some("KEY_VALUE_SET") if is_key_block(block) => {
                    pages[page_idx].key_values.push(self.build_key_value(block)?);
                }
                _ => {}
            }
        }

        Ok(Document { pages })
    }

    fn blocks_of_type(&self, block_type: &'a str) -> impl Iterator<Item = &'a Block> {
        let blocks = self.blocks;
        blocks
            .iter()
            .filter(move |b| b.block_type.as_deref() == Some(block_type))
    }

    fn resolve(&self, id: &str) -> Result<&'a Block> {
        self.blocks_by_id
            .get(id)
            .copied()
            .ok_or_else(|| anyhow!("block references missing child block {}", id))
    }

    fn build_line(&self, line: &'a Block) -> Result<Line> {
        let mut words = Vec::new();
        for id in line.related_ids("CHILD") {
            let child = self.resolve(id)?;
            if child.block_type.as_deref() == Some("WORD") {
                words.push(Word {
                    text: child.text.clone().unwrap_or_default(),
                    confidence: child.confidence,
                });
            }
        }
        // LINE blocks carry their own text; joining the words is the fallback.
        let text = line.text.clone().unwrap_or_else(|| {
            words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });
        Ok(Line { text, words })
    }

    fn build_table(&self, table: &'a Block) -> Result<Table> {
        let mut cells = Vec::new();
        for id in table.related_ids("CHILD") {
            let child = self.resolve(id)?;
            if child.block_type.as_deref() == Some("CELL") {
                cells.push(TableCell {
                    row: child.row_index.unwrap_or(0).max(0) as u32,
                    column: child.column_index.unwrap_or(0).max(0) as u32,
                    row_span: child.row_span.unwrap_or(1).max(1) as u32,
                    column_span: child.column_span.unwrap_or(1).max(1) as u32,
                    text: self.collect_text(child)?,
                });
            }
        }
        let row_count = cells
            .iter()
            .map(|c| c.row + c.row_span - 1)
            .max()
            .unwrap_or(0);
        let column_count = cells
            .iter()
            .map(|c| c.column + c.column_span - 1)
            .max()
            .unwrap_or(0);
        Ok(Table {
            row_count,
            column_count,
            cells,
        })
    }

    fn build_key_value(&self, key_block: &'a Block) -> Result<KeyValue> {
        let key = self.collect_text(key_block)?;
        let mut value = String::new();
        for id in key_block.related_ids("VALUE") {
            let value_block = self.resolve(id)?;
            let text = self.collect_text(value_block)?;
            if !text.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(&text);
            }
        }
        Ok(KeyValue { key, value })
    }

    /// Gather the text under a block by walking its CHILD relationships.
    ///
    /// A visited set guards against rendering a block twice when several
    /// parents reference it, and against cycles in malformed responses.
    fn collect_text(&self, block: &'a Block) -> Result<String> {
        let mut visited = HashSet::new();
        let mut pieces = Vec::new();
        self.collect_text_into(block, &mut visited, &mut pieces)?;
        Ok(pieces.join(" "))
    }

    fn collect_text_into(
        &self,
        block: &'a Block,
        visited: &mut HashSet<&'a str>,
        pieces: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(id) = block.id.as_deref()
            && !visited.insert(id)
        {
            return Ok(());
        }
        match block.block_type.as_deref() {
            Some("WORD") => {
                if let Some(text) = &block.text {
                    pieces.push(text.clone());
                }
            }
            Some("SELECTION_ELEMENT") => {
                pieces.push(
                    block
                        .selection_status
                        .clone()
                        .unwrap_or_else(|| "NOT_SELECTED".to_owned()),
                );
            }
            _ => {}
        }
        for id in block.related_ids("CHILD") {
            let child = self.resolve(id)?;
            self.collect_text_into(child, visited, pieces)?;
        }
        Ok(())
    }
}

/// Is this KEY_VALUE_SET block the key side of a pair?
fn is_key_block(block: &Block) -> bool {
    block.entity_types.iter().any(|t| t == "KEY")
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::response::Relationship;

    fn block(id: &str, block_type: &str) -> Block {
        Block {
            id: Some(id.to_owned()),
            block_type: Some(block_type.to_owned()),
            ..Block::default()
        }
    }

    fn with_text(mut b: Block, text: &str) -> Block {
        b.text = Some(text.to_owned());
        b
    }

    fn with_children(mut b: Block, ids: &[&str]) -> Block {
        b.relationships.push(Relationship {
            relationship_type: "CHILD".to_owned(),
            ids: ids.iter().map(|&id| id.to_owned()).collect(),
        });
        b
    }

    fn response(blocks: Vec<Block>) -> TextractResponse {
        TextractResponse {
            blocks,
            ..TextractResponse::default()
        }
    }

    #[test]
    fn test_builds_pages_of_lines_and_words() {
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["l1", "l2"]),
            with_children(with_text(block("l1", "LINE"), "Hello world"), &["w1", "w2"]),
            with_text(block("w1", "WORD"), "Hello"),
            with_text(block("w2", "WORD"), "world"),
            with_children(with_text(block("l2", "LINE"), "Goodbye"), &["w3"]),
            with_text(block("w3", "WORD"), "Goodbye"),
        ]))
        .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.pages[0].lines.len(), 2);
        assert_eq!(document.pages[0].lines[0].words.len(), 2);
        assert_eq!(document.text(), "Hello world\nGoodbye");
    }

    #[test]
    fn test_multiple_pages_keep_their_own_lines() {
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["l1"]),
            with_children(block("p2", "PAGE"), &["l2"]),
            with_text(block("l1", "LINE"), "page one"),
            with_text(block("l2", "LINE"), "page two"),
        ]))
        .unwrap();
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.text(), "page one\n\npage two");
    }

    #[test]
    fn test_builds_tables() {
        let mut c1 = with_children(block("c1", "CELL"), &["w1"]);
        c1.row_index = Some(1);
        c1.column_index = Some(1);
        let mut c2 = with_children(block("c2", "CELL"), &["w2"]);
        c2.row_index = Some(1);
        c2.column_index = Some(2);
        c2.column_span = Some(2);
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["t1"]),
            with_children(block("t1", "TABLE"), &["c1", "c2"]),
            c1,
            c2,
            with_text(block("w1", "WORD"), "Name"),
            with_text(block("w2", "WORD"), "Amount"),
        ]))
        .unwrap();
        let table = &document.pages[0].tables[0];
        assert_eq!(table.row_count, 1);
        assert_eq!(table.column_count, 3);
        assert_eq!(table.cells[0].text, "Name");
        assert_eq!(table.cells[1].text, "Amount");
    }

    #[test]
    fn test_builds_key_values_with_selection_elements() {
        let mut key = with_children(block("k1", "KEY_VALUE_SET"), &["w1"]);
        key.entity_types.push("KEY".to_owned());
        key.relationships.push(Relationship {
            relationship_type: "VALUE".to_owned(),
            ids: vec!["v1".to_owned()],
        });
        let mut value = with_children(block("v1", "KEY_VALUE_SET"), &["s1"]);
        value.entity_types.push("VALUE".to_owned());
        let mut checkbox = block("s1", "SELECTION_ELEMENT");
        checkbox.selection_status = Some("SELECTED".to_owned());
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["k1"]),
            key,
            value,
            checkbox,
            with_text(block("w1", "WORD"), "Subscribed?"),
        ]))
        .unwrap();
        let kv = &document.pages[0].key_values[0];
        assert_eq!(kv.key, "Subscribed?");
        assert_eq!(kv.value, "SELECTED");
    }

    #[test]
    fn test_orphan_tables_attach_by_page_number() {
        let mut table = with_children(block("t1", "TABLE"), &["c1"]);
        table.page = Some(2);
        let mut cell = with_children(block("c1", "CELL"), &["w1"]);
        cell.row_index = Some(1);
        cell.column_index = Some(1);
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["l1"]),
            block("p2", "PAGE"),
            with_text(block("l1", "LINE"), "first"),
            table,
            cell,
            with_text(block("w1", "WORD"), "orphan"),
        ]))
        .unwrap();
        assert!(document.pages[0].tables.is_empty());
        assert_eq!(document.pages[1].tables.len(), 1);
        assert_eq!(document.pages[1].tables[0].cells[0].text, "orphan");
    }

    #[test]
    fn test_shared_child_renders_once_per_traversal() {
        // Both cells reference the same word; each cell still gets its text.
        let mut c1 = with_children(block("c1", "CELL"), &["w1"]);
        c1.row_index = Some(1);
        c1.column_index = Some(1);
        let mut c2 = with_children(block("c2", "CELL"), &["w1", "w1"]);
        c2.row_index = Some(1);
        c2.column_index = Some(2);
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["t1"]),
            with_children(block("t1", "TABLE"), &["c1", "c2"]),
            c1,
            c2,
            with_text(block("w1", "WORD"), "shared"),
        ]))
        .unwrap();
        let table = &document.pages[0].tables[0];
        assert_eq!(table.cells[0].text, "shared");
        // Duplicate references inside one traversal collapse to one render.
        assert_eq!(table.cells[1].text, "shared");
    }

    #[test]
    fn test_missing_child_is_an_error() {
        let err = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &["l1"]),
            with_children(with_text(block("l1", "LINE"), "x"), &["gone"]),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("missing child block gone"));
    }

    #[test]
    fn test_lines_without_page_blocks_form_an_implicit_page() {
        let document = Document::from_response(&response(vec![
            with_text(block("l1", "LINE"), "floating"),
        ]))
        .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.text(), "floating");
    }

    #[test]
    fn test_blocks_without_ids_are_skipped() {
        let mut anonymous = with_text(block("", "LINE"), "ghost");
        anonymous.id = None;
        let document = Document::from_response(&response(vec![
            with_children(block("p1", "PAGE"), &[]),
            anonymous,
        ]))
        .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert!(document.pages[0].lines.is_empty());
    }
}
