//! Source locations, source streams, and diagnostic reports shared by every
//! stage of the Flow language pipeline (lexer, parser, IR builder, codegen).

mod diagnostic;
mod source_map;
mod source_stream;

pub use diagnostic::{Diagnostic, DiagnosticsReport, Severity};
pub use source_map::{Position, Span, SourceId, SourceMap, SourceOrigin};
pub use source_stream::SourceStream;
