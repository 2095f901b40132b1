//! Tools the reasoning engine can call

mod builtin;
mod calendar;
mod registry;
mod schema;
mod store;
mod todo;

pub use builtin::{BuiltinTools, MAX_TIMER_SECS};
pub use calendar::{Calendar, CalendarEvent};
pub use registry::{
    FnTool, TOOL_ERROR_PREFIX, ToolError, ToolHandler, ToolInvocation, ToolRegistry, ToolSpec,
    from_fn,
};
pub use schema::{Param, ParamKind, ToolSchema};
pub use store::JsonFile;
pub use todo::TodoList;
