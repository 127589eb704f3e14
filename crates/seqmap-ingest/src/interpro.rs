// InterPro entry descriptions and hierarchy
//
// File Formats:
// 1. entry.list - TSV file with InterPro entry metadata
//    Format: ENTRY_AC ENTRY_TYPE ENTRY_NAME
//    Example: IPR041653 Repeat Importin repeat 4
//
// 2. ParentChildTreeFile.txt - one entry per line, nesting depth given by
//    leading "--" pairs
//    Example:
//      IPR000008::C2 domain::
//      --IPR014705::Syntaxin-binding protein, C2 domain::

use crate::cache::load_or_build;
use crate::config::{ProviderOptions, SourceConfig};
use crate::decompression::open_text;
use crate::fetch::Fetcher;
use crate::marshal::{read_rows, Delimited};
use crate::run_blocking;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

pub const CACHE_DIR: &str = "interPro";
const DATA_FILE: &str = "interPro-data.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterProEntry {
    pub description: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

/// Node of the InterPro tree for downstream tree loaders.
/// Roots have no `parents` and depth 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    pub depth: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InterProIndex {
    index: BTreeMap<String, InterProEntry>,
    parents: BTreeMap<String, Option<String>>,
}

pub struct InterProProvider {
    index: BTreeMap<String, InterProEntry>,
    parents: BTreeMap<String, Option<String>>,
}

impl InterProProvider {
    pub async fn load(fetcher: &Fetcher, sources: &SourceConfig, options: &ProviderOptions) -> Result<Self> {
        let dir = options.provider_dir(CACHE_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let data: InterProIndex = load_or_build(&dir.join(DATA_FILE), options.use_cache, || async {
            info!("Fetching InterPro entries from {}", sources.interpro_entries.primary);
            let entry_path = fetcher.get_with_fallback(&sources.interpro_entries, &dir).await?;
            let index = run_blocking(move || parse_entries(&entry_path)).await?;

            info!("Fetching InterPro hierarchy from {}", sources.interpro_tree.primary);
            let tree_path = fetcher.get_with_fallback(&sources.interpro_tree, &dir).await?;
            let parents = run_blocking(move || parse_parents(&tree_path)).await?;

            Ok(InterProIndex { index, parents })
        })
        .await?;

        debug!("InterPro index length {} parent length {}", data.index.len(), data.parents.len());
        Ok(Self::from_parts(data.index, data.parents))
    }

    pub fn from_parts(
        index: BTreeMap<String, InterProEntry>,
        parents: BTreeMap<String, Option<String>>,
    ) -> Self {
        Self { index, parents }
    }

    pub fn description(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(|e| e.description.as_str())
    }

    pub fn entry_type(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(|e| e.entry_type.as_str())
    }

    pub fn parent_id(&self, id: &str) -> Option<&str> {
        self.parents.get(id).and_then(|p| p.as_deref())
    }

    /// Ancestors of `id` ending with `id` itself, root first.
    /// A malformed hierarchy with a cycle stops at the first repeated id.
    pub fn lineage(&self, id: &str) -> Vec<String> {
        let mut lineage = vec![id.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([id]);

        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                warn!("Cycle in InterPro hierarchy at {}", parent);
                break;
            }
            lineage.push(parent.to_string());
            current = self.parent_id(parent);
        }

        lineage.reverse();
        lineage
    }

    /// `(id, description, depth)` along the lineage, depth counted from 1
    pub fn lineage_with_names(&self, id: &str) -> Vec<(String, Option<String>, usize)> {
        self.lineage(id)
            .into_iter()
            .enumerate()
            .map(|(ii, code)| {
                let name = self.description(&code).map(str::to_string);
                (code, name, ii + 1)
            })
            .collect()
    }

    /// Every indexed entry as a tree node, optionally restricted to `filter`
    pub fn tree_node_list(&self, filter: Option<&HashSet<String>>) -> Vec<TreeNode> {
        self.index
            .keys()
            .filter(|id| filter.map_or(true, |f| f.contains(*id)))
            .map(|id| {
                let name = self.description(id).map(str::to_string);
                match self.parent_id(id) {
                    None => TreeNode {
                        id: id.clone(),
                        name,
                        parents: None,
                        depth: 0,
                    },
                    Some(parent) => TreeNode {
                        id: id.clone(),
                        name,
                        parents: Some(vec![parent.to_string()]),
                        depth: self.lineage(id).len() - 1,
                    },
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Production data has well over 1000 entries
    pub fn test_cache(&self, min_count: usize) -> bool {
        info!("InterPro entries {}", self.index.len());
        self.index.len() >= min_count
    }
}

pub fn parse_entries(path: &Path) -> Result<BTreeMap<String, InterProEntry>> {
    let mut index = BTreeMap::new();
    for row in read_rows(path, Delimited::TSV)? {
        if row.len() < 3 || row[0].trim() == "ENTRY_AC" {
            continue;
        }
        index.insert(
            row[0].trim().to_uppercase(),
            InterProEntry {
                entry_type: row[1].trim().to_string(),
                description: row[2].trim().to_string(),
            },
        );
    }
    Ok(index)
}

/// `{id: parent id}` with `None` for top level entries
pub fn parse_parents(path: &Path) -> Result<BTreeMap<String, Option<String>>> {
    let mut parents = BTreeMap::new();
    let mut stack: Vec<String> = Vec::new();

    for line in open_text(path)?.lines() {
        let line = line?;
        let content = line.trim_end();
        if content.is_empty() {
            continue;
        }

        let pieces: Vec<&str> = content.split("--").collect();
        let depth = pieces.len() - 1;
        let last = pieces[depth];
        let id = last.split("::").next().unwrap_or(last).trim().to_string();

        stack.truncate(depth);
        stack.push(id.clone());
        let parent = if stack.len() > 1 {
            Some(stack[stack.len() - 2].clone())
        } else {
            None
        };
        parents.insert(id, parent);
    }

    Ok(parents)
}
