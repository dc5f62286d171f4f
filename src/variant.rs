//! Abstraction granularities for propagation-based call graph construction.
//!
//! Each variant decides which abstraction unit a method or field reports its
//! instantiated classes to. The propagation engine in [`crate::builder`] is
//! shared by all of them.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use clap::ValueEnum;
use serde::Serialize;

use crate::builder::{BuildOutput, CallGraphBuilder};
use crate::error::CallGraphError;
use crate::hierarchy::ClassHierarchy;
use crate::ir::{ClassId, FieldId, MethodId, Program};

/// Key under which instantiated classes are tracked.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Unit {
    Global,
    Method(MethodId),
    Field(FieldId),
    Class(ClassId),
}

/// Strategy mapping methods and fields onto abstraction units.
pub trait Granularity {
    fn method_unit(&self, program: &Program, method: MethodId) -> Unit;
    fn field_unit(&self, program: &Program, field: FieldId) -> Unit;

    /// When false every concrete subtype counts as instantiated and nothing is propagated.
    fn tracks_instantiation(&self) -> bool {
        true
    }

    /// Whether `new T[n]` marks the element class of `T` as instantiated.
    fn counts_array_allocations(&self) -> bool {
        false
    }
}

/// Class hierarchy analysis.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cha;

/// Rapid type analysis: one global set of instantiated classes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rta;

/// Separate sets per method and per field.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xta;

/// Sets per method; fields share the set of their declaring class.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fta;

/// Methods share the set of their declaring class; sets per field.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mta;

/// Methods and fields share the set of their declaring class.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cta;

impl Granularity for Cha {
    fn method_unit(&self, _program: &Program, _method: MethodId) -> Unit {
        Unit::Global
    }

    fn field_unit(&self, _program: &Program, _field: FieldId) -> Unit {
        Unit::Global
    }

    fn tracks_instantiation(&self) -> bool {
        false
    }
}

impl Granularity for Rta {
    fn method_unit(&self, _program: &Program, _method: MethodId) -> Unit {
        Unit::Global
    }

    fn field_unit(&self, _program: &Program, _field: FieldId) -> Unit {
        Unit::Global
    }

    fn counts_array_allocations(&self) -> bool {
        true
    }
}

impl Granularity for Xta {
    fn method_unit(&self, _program: &Program, method: MethodId) -> Unit {
        Unit::Method(method)
    }

    fn field_unit(&self, _program: &Program, field: FieldId) -> Unit {
        Unit::Field(field)
    }
}

impl Granularity for Fta {
    fn method_unit(&self, _program: &Program, method: MethodId) -> Unit {
        Unit::Method(method)
    }

    fn field_unit(&self, program: &Program, field: FieldId) -> Unit {
        Unit::Class(program.field(field).class)
    }
}

impl Granularity for Mta {
    fn method_unit(&self, program: &Program, method: MethodId) -> Unit {
        Unit::Class(program.method(method).class)
    }

    fn field_unit(&self, _program: &Program, field: FieldId) -> Unit {
        Unit::Field(field)
    }
}

impl Granularity for Cta {
    fn method_unit(&self, program: &Program, method: MethodId) -> Unit {
        Unit::Class(program.method(method).class)
    }

    fn field_unit(&self, program: &Program, field: FieldId) -> Unit {
        Unit::Class(program.field(field).class)
    }
}

/// Selectable call graph construction algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Cha,
    Rta,
    #[default]
    Xta,
    Fta,
    Mta,
    Cta,
}

impl Variant {
    pub const ALL: [Variant; 6] = [
        Variant::Cha,
        Variant::Rta,
        Variant::Xta,
        Variant::Fta,
        Variant::Mta,
        Variant::Cta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Cha => "cha",
            Variant::Rta => "rta",
            Variant::Xta => "xta",
            Variant::Fta => "fta",
            Variant::Mta => "mta",
            Variant::Cta => "cta",
        }
    }

    /// Build the call graph rooted at `entry` with this variant's granularity.
    pub fn build(
        self,
        hierarchy: &ClassHierarchy<'_>,
        entry: MethodId,
    ) -> Result<BuildOutput, CallGraphError> {
        match self {
            Variant::Cha => CallGraphBuilder::new(hierarchy, Cha, entry).build(),
            Variant::Rta => CallGraphBuilder::new(hierarchy, Rta, entry).build(),
            Variant::Xta => CallGraphBuilder::new(hierarchy, Xta, entry).build(),
            Variant::Fta => CallGraphBuilder::new(hierarchy, Fta, entry).build(),
            Variant::Mta => CallGraphBuilder::new(hierarchy, Mta, entry).build(),
            Variant::Cta => CallGraphBuilder::new(hierarchy, Cta, entry).build(),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        let lowered = value.to_ascii_lowercase();
        match Variant::ALL.iter().find(|variant| variant.name() == lowered) {
            Some(variant) => Ok(*variant),
            None => bail!("unknown call graph variant: {value}"),
        }
    }
}
