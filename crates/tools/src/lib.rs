mod catalog;
mod composed;
mod error;
mod evidence;
mod glob;
mod primitives;
mod registry;

pub use catalog::{
    catalog_json, descriptor, RiskLevel, ToolCategory, ToolDescriptor, PLANNABLE_TOOLS,
    TOOL_CATALOG,
};
pub use composed::{ReadCodeArgs, SearchCodeArgs};
pub use error::{Result, ToolError};
pub use evidence::extract_citations;
pub use glob::{glob_match, matches_file_pattern};
pub use registry::{RegistryBuilder, ToolHandler, ToolRegistry, Toolbox};
