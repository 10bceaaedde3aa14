mod document;

pub use document::{
    parse_script_document, CommandLine, DocumentNode, ScriptDocument, SectionNode, ValueNode,
};
