//! Frontend framework
//!
//! A frontend is a family of [`Parser`] implementations handling one source
//! graph format. Each parser owns exactly one (format, operator) pair: it
//! validates the source node's declared options, resolves its inputs through
//! the tensor cache (registering constant weights at parse time), translates
//! format-specific enums into the IR's closed sets, and allocates output
//! placeholders. The [`ParserRegistry`](registry::ParserRegistry) maps
//! (format, operator) pairs to parsers and is populated once, before any
//! parsing begins.

pub mod flat;
pub mod native;
pub mod registry;

use crate::builder::cache::TensorCache;
use crate::error::ParseError;
use crate::ir::{Graph, Node};
use crate::proto::{FlatModel, FlatOperator};

use native::NativeNode;

/// Source formats known to the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Flatbuffer-style exported model (`kiln.flat` wire format)
    Flat,
    /// In-memory algebraic graph from the training stack
    Native,
}

impl Format {
    /// Static name for diagnostics and registry keys
    pub fn name(self) -> &'static str {
        match self {
            Format::Flat => "flat",
            Format::Native => "native",
        }
    }
}

/// Borrowed view of one source node, format-erased for registry dispatch
pub enum SourceNodeRef<'a> {
    /// A flat-format operator with its owning model (for tensor table access)
    Flat {
        /// The operator being parsed
        op: &'a FlatOperator,
        /// The model owning the tensor table
        model: &'a FlatModel,
    },
    /// A native algebraic node
    Native {
        /// The node being parsed
        node: &'a NativeNode,
    },
}

impl<'a> SourceNodeRef<'a> {
    /// Expect the flat variant; parsers dispatch on registry keys, so a
    /// mismatch means a mis-registered parser.
    pub fn expect_flat(&self) -> Result<(&'a FlatOperator, &'a FlatModel), ParseError> {
        match self {
            SourceNodeRef::Flat { op, model } => Ok((*op, *model)),
            SourceNodeRef::Native { node } => Err(ParseError::UnsupportedOp {
                format: Format::Flat.name(),
                op: node.name.clone(),
            }),
        }
    }

    /// Expect the native variant
    pub fn expect_native(&self) -> Result<&'a NativeNode, ParseError> {
        match self {
            SourceNodeRef::Native { node } => Ok(*node),
            SourceNodeRef::Flat { op, .. } => Err(ParseError::UnsupportedOp {
                format: Format::Native.name(),
                op: op.name.clone(),
            }),
        }
    }
}

/// Mutable build state handed to parsers
///
/// Parsers register tensors into the graph under construction through the
/// cache; the builder owns node insertion and inference.
pub struct ParseContext<'g> {
    /// The graph under construction
    pub graph: &'g mut Graph,
    /// Source-identity → tensor id deduplication
    pub cache: &'g mut TensorCache,
}

/// One (format, operator) parser
///
/// `parse` translates a single source operator into one IR node, registering
/// its input and output tensors through the context. Error conditions —
/// malformed options, arity mismatches, bad weight buffers — are reported as
/// distinct [`ParseError`] kinds, never silently skipped.
pub trait Parser: Send + Sync {
    /// Translate one source node into an IR node
    fn parse(&self, source: &SourceNodeRef<'_>, ctx: &mut ParseContext<'_>)
        -> Result<Node, ParseError>;
}
