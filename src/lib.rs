//! Propagation-based call graph construction for object-oriented programs.
//!
//! A [`Variant`] selects how precisely instantiated classes are tracked:
//! CHA assumes every subtype is live, RTA keeps one global set, and the XTA
//! family (XTA, FTA, MTA, CTA) keeps sets per method, field or class. All of
//! them run on the same worklist engine in [`builder`].
//!
//! ```no_run
//! use xta_callgraph::{ClassHierarchy, Variant, load_program};
//!
//! # fn main() -> anyhow::Result<()> {
//! let program = load_program(std::path::Path::new("program.json"))?;
//! let hierarchy = ClassHierarchy::new(&program);
//! let entry = program.entry().expect("entry method");
//! let output = Variant::Xta.build(&hierarchy, entry)?;
//! println!("{} edges", output.graph.edge_count());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod ir;
pub mod load;
pub mod pending;
pub mod report;
pub mod store;
#[cfg(test)]
mod testing;
pub mod variant;

pub use builder::{BuildOutput, BuildStats, CallGraphBuilder};
pub use error::CallGraphError;
pub use graph::{CallGraph, Edge};
pub use hierarchy::ClassHierarchy;
pub use ir::{CallKind, CallSiteId, ClassId, FieldId, MethodId, Program};
pub use load::{load_program, parse_program, resolve_method_name};
pub use report::CallGraphReport;
pub use variant::{Granularity, Unit, Variant};
