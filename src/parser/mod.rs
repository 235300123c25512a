pub mod comments;
pub mod flow;
pub mod route;
pub mod types;

pub use comments::merge_comment_blocks;
pub use flow::{parse_flow_document, parse_flow_file};
pub use route::RouteResolver;
pub use types::{Expectation, FlowDefinition, FlowStep, PageTarget, RawComment};
