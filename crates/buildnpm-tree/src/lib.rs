mod assemble;
mod parse;

pub use assemble::{assemble_manifest, format_missing_dependencies};
pub use parse::parse_dependency_tree;
