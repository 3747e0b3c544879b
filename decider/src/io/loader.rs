//! Definition loading from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::parse::{DefinitionSource, parse_definitions};
use crate::tree::Tree;

/// Read and parse one or more definition files into a single resolved tree.
///
/// All files share one namespace: a `#SubBehavior` reference in any file may
/// name a decision block declared in any other.
#[instrument(skip_all, fields(files = paths.len()))]
pub fn load_tree<P: AsRef<Path>>(paths: &[P]) -> Result<Tree> {
    if paths.is_empty() {
        bail!("no definition files given");
    }
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read definition {}", path.display()))?;
        sources.push(DefinitionSource {
            origin: path.display().to_string(),
            text,
        });
    }
    let tree = parse_definitions(&sources)?;
    debug!(elements = tree.len(), roots = tree.roots().len(), "loaded definition");
    Ok(tree)
}
