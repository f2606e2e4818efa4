pub mod datanode_details;
pub mod file_tree;

use file_tree::{FileTree, partial_paths};
use proto::packet::BlockHeader;
use std::collections::HashMap;
use utilities::result::Result;

/// The in-memory namespace: the path tree plus the placement index mapping
/// file path to block number to every placement observed for it.
#[derive(Debug, Default)]
pub struct NamenodeState {
    pub file_tree: FileTree,
    pub filemap: HashMap<String, HashMap<usize, Vec<BlockHeader>>>,
}

impl NamenodeState {
    pub fn new() -> Self {
        Self {
            file_tree: FileTree::new(),
            filemap: HashMap::new(),
        }
    }

    /// Adds a placement observation in its correct location, creating
    /// intermediate directory nodes on demand. Ok(true) means the header was
    /// newly added, Ok(false) that an identical placement was already known.
    pub fn merge_header(&mut self, header: &BlockHeader) -> Result<bool> {
        if header.datanode_id.is_empty() {
            return Err("header carries no datanode id".into());
        }
        if header.block_num >= header.num_blocks {
            return Err(format!(
                "block number {} out of range for {} blocks",
                header.block_num, header.num_blocks
            )
            .into());
        }
        let partials = partial_paths(&header.filename)
            .ok_or_else(|| format!("invalid file path {:?}", header.filename))?;
        let (leaf, directories) = match partials.split_last() {
            Some(split) => split,
            None => return Err(format!("invalid file path {:?}", header.filename).into()),
        };

        let mut current = file_tree::ROOT;
        for partial in directories {
            if self.filemap.contains_key(partial) {
                return Err(format!("path component {partial} is a file").into());
            }
            current = match self.file_tree.child_by_path(current, partial) {
                Some(index) => index,
                None => self.file_tree.insert_child(current, partial.clone()),
            };
        }
        if self.file_tree.child_by_path(current, leaf).is_some() {
            // a node without placements can only be a directory
            if !self.filemap.contains_key(leaf) {
                return Err(format!("path {leaf} is held by a directory").into());
            }
        } else {
            self.file_tree.insert_child(current, leaf.clone());
        }

        let placements = self
            .filemap
            .entry(leaf.clone())
            .or_default()
            .entry(header.block_num)
            .or_default();
        if placements.contains(header) {
            return Ok(false);
        }
        placements.push(header.clone());
        Ok(true)
    }

    /// Builds the GETHEADERS response: the first observed placement for each
    /// of the file's blocks. Any gap is an error, never a partial response.
    pub fn headers_for_file(&self, fname: &str) -> Result<Vec<BlockHeader>> {
        if !self.file_tree.contains(fname) {
            return Err(format!("File not found {fname}").into());
        }
        // a tree node without placements is a directory, equally a miss
        let blocks = self
            .filemap
            .get(fname)
            .ok_or_else(|| format!("File not found {fname}"))?;
        let first = blocks
            .get(&0)
            .and_then(|placements| placements.first())
            .ok_or("Could not locate first block in file")?;
        let num_blocks = first.num_blocks;
        let mut headers = Vec::with_capacity(num_blocks);
        for block_num in 0..num_blocks {
            let placement = blocks
                .get(&block_num)
                .and_then(|placements| placements.first())
                .ok_or_else(|| format!("Could not locate block {block_num} of {fname}"))?;
            headers.push(placement.clone());
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(filename: &str, block_num: usize, num_blocks: usize) -> BlockHeader {
        BlockHeader {
            datanode_id: "D1".to_owned(),
            filename: filename.to_owned(),
            size: 500,
            block_num,
            num_blocks,
        }
    }

    #[test]
    fn merge_creates_directories_and_file() {
        let mut state = NamenodeState::new();
        assert!(state.merge_header(&header("/a/b", 0, 2)).unwrap());
        assert!(state.merge_header(&header("/a/b", 1, 2)).unwrap());
        assert!(state.file_tree.contains("/a"));
        assert!(state.file_tree.contains("/a/b"));
        assert!(!state.filemap.contains_key("/a"));
        assert_eq!(state.filemap["/a/b"].len(), 2);
        assert_eq!(state.filemap["/a/b"][&0][0], header("/a/b", 0, 2));
    }

    #[test]
    fn merge_deduplicates_by_value() {
        let mut state = NamenodeState::new();
        assert!(state.merge_header(&header("/a/b", 0, 2)).unwrap());
        assert!(!state.merge_header(&header("/a/b", 0, 2)).unwrap());
        assert_eq!(state.filemap["/a/b"][&0].len(), 1);
        // a different placement of the same block is kept alongside
        let mut other = header("/a/b", 0, 2);
        other.datanode_id = "D2".to_owned();
        assert!(state.merge_header(&other).unwrap());
        assert_eq!(state.filemap["/a/b"][&0].len(), 2);
    }

    #[test]
    fn merge_rejects_block_number_out_of_range() {
        let mut state = NamenodeState::new();
        assert!(state.merge_header(&header("/a/b", 2, 2)).is_err());
        assert!(state.merge_header(&header("/a/b", 1, 2)).is_ok());
    }

    #[test]
    fn merge_rejects_malformed_paths() {
        let mut state = NamenodeState::new();
        assert!(state.merge_header(&header("a/b", 0, 1)).is_err());
        assert!(state.merge_header(&header("/", 0, 1)).is_err());
        assert!(state.merge_header(&header("/a//b", 0, 1)).is_err());
        let mut no_node = header("/a/b", 0, 1);
        no_node.datanode_id = String::new();
        assert!(state.merge_header(&no_node).is_err());
    }

    #[test]
    fn merge_rejects_file_directory_conflicts() {
        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b", 0, 1)).unwrap();
        // the file /a/b cannot also act as a directory
        assert!(state.merge_header(&header("/a/b/c", 0, 1)).is_err());

        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b/c", 0, 1)).unwrap();
        // the directory /a/b cannot also hold blocks
        assert!(state.merge_header(&header("/a/b", 0, 1)).is_err());
    }

    #[test]
    fn merge_accepts_file_directly_under_existing_directory() {
        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b", 0, 1)).unwrap();
        state.merge_header(&header("/a/c", 0, 1)).unwrap();
        assert!(state.filemap.contains_key("/a/c"));
        assert!(state.file_tree.contains("/a/c"));
    }

    #[test]
    fn headers_for_file_returns_every_block() {
        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b", 0, 2)).unwrap();
        state.merge_header(&header("/a/b", 1, 2)).unwrap();
        let headers = state.headers_for_file("/a/b").unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1].block_num, 1);
    }

    #[test]
    fn headers_for_file_unknown_path() {
        let state = NamenodeState::new();
        let err = state.headers_for_file("/nope").unwrap_err();
        assert_eq!(err.to_string(), "File not found /nope");
    }

    #[test]
    fn headers_for_file_rejects_a_directory_path() {
        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b", 0, 1)).unwrap();
        let err = state.headers_for_file("/a").unwrap_err();
        assert_eq!(err.to_string(), "File not found /a");
    }

    #[test]
    fn headers_for_file_refuses_partial_response() {
        let mut state = NamenodeState::new();
        state.merge_header(&header("/a/b", 0, 2)).unwrap();
        let err = state.headers_for_file("/a/b").unwrap_err();
        assert!(err.to_string().contains("block 1"));
    }
}
