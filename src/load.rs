use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::ir::{CallKind, ClassId, FieldId, Invoke, MethodId, MethodRef, Program, Stmt, Type};

const PRIMITIVES: [&str; 8] = ["boolean", "byte", "char", "short", "int", "long", "float", "double"];

/// Program description as written in the JSON input.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProgram {
    entry: Option<String>,
    classes: Vec<RawClass>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClass {
    name: String,
    #[serde(rename = "super", default)]
    super_class: Option<String>,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(rename = "abstract", default)]
    is_abstract: bool,
    #[serde(rename = "interface", default)]
    is_interface: bool,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    methods: Vec<RawMethod>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMethod {
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(rename = "return", default)]
    ret: Option<String>,
    #[serde(rename = "static", default)]
    is_static: bool,
    #[serde(rename = "abstract", default)]
    is_abstract: bool,
    #[serde(default)]
    body: Vec<RawStmt>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RawStmt {
    New { class: String },
    NewArray { element: String },
    Store { field: String },
    Load { field: String },
    Invoke { kind: String, class: String, method: String },
    Other,
}

/// Read and resolve a JSON program description.
pub fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_program(&text).with_context(|| format!("failed to load {}", path.display()))
}

pub fn parse_program(text: &str) -> Result<Program> {
    let raw: RawProgram = serde_json::from_str(text).context("invalid program description")?;
    let mut program = Program::new();

    // Classes first so that every later name can be resolved regardless of order.
    let mut class_ids = Vec::with_capacity(raw.classes.len());
    for class in &raw.classes {
        if program.class_by_name(&class.name).is_some() {
            bail!("duplicate class {}", class.name);
        }
        class_ids.push(program.add_class(class.name.as_str()));
    }

    for (raw_class, class) in raw.classes.iter().zip(&class_ids) {
        let super_class = raw_class
            .super_class
            .as_deref()
            .map(|name| lookup_class(&program, name, &raw_class.name))
            .transpose()?;
        let interfaces = raw_class
            .interfaces
            .iter()
            .map(|name| lookup_class(&program, name, &raw_class.name))
            .collect::<Result<Vec<_>>>()?;
        let info = program.class_mut(*class);
        info.super_class = super_class;
        info.interfaces = interfaces;
        info.is_abstract = raw_class.is_abstract;
        info.is_interface = raw_class.is_interface;
    }

    for (raw_class, class) in raw.classes.iter().zip(&class_ids) {
        for field in &raw_class.fields {
            let ty = parse_type(&program, &field.ty);
            program.add_field(*class, field.name.as_str(), ty);
        }
    }

    let mut methods = Vec::new();
    for (raw_class, class) in raw.classes.iter().zip(&class_ids) {
        for raw_method in &raw_class.methods {
            let params = raw_method
                .params
                .iter()
                .map(|param| parse_type(&program, param))
                .collect();
            let ret = raw_method
                .ret
                .as_deref()
                .filter(|ret| *ret != "void")
                .map(|ret| parse_type(&program, ret));
            let method = program.add_method(*class, raw_method.name.as_str(), params, ret);
            let info = program.method_mut(method);
            info.is_static = raw_method.is_static;
            info.is_abstract = raw_method.is_abstract;
            methods.push((method, raw_method));
        }
    }

    for (method, raw_method) in methods {
        for stmt in &raw_method.body {
            let stmt = resolve_stmt(&mut program, stmt)
                .with_context(|| format!("in method {}", program.method_name(method)))?;
            program.push_stmt(method, stmt);
        }
    }

    if let Some(entry) = raw.entry.as_deref() {
        let method = resolve_method_name(&program, entry)?;
        program.set_entry(method);
    }

    Ok(program)
}

/// Resolve `Class.name(params)` against a loaded program.
pub fn resolve_method_name(program: &Program, name: &str) -> Result<MethodId> {
    program
        .method_by_name(&normalize_signature(name))
        .with_context(|| format!("unknown method {name}"))
}

fn resolve_stmt(program: &mut Program, stmt: &RawStmt) -> Result<Stmt> {
    let stmt = match stmt {
        RawStmt::New { class } => Stmt::New(lookup_class(program, class, "new")?),
        RawStmt::NewArray { element } => Stmt::NewArray(parse_type(program, element)),
        RawStmt::Store { field } => Stmt::StoreField(lookup_field(program, field)?),
        RawStmt::Load { field } => Stmt::LoadField(lookup_field(program, field)?),
        RawStmt::Invoke { kind, class, method } => {
            let class = lookup_class(program, class, "invoke")?;
            let member = program.intern_member(&normalize_signature(method));
            Stmt::Invoke(Invoke {
                kind: CallKind::from_name(kind),
                target: MethodRef { class, member },
            })
        }
        RawStmt::Other => Stmt::Other,
    };
    Ok(stmt)
}

fn lookup_class(program: &Program, name: &str, referrer: &str) -> Result<ClassId> {
    program
        .class_by_name(name)
        .with_context(|| format!("unknown class {name} referenced by {referrer}"))
}

fn lookup_field(program: &Program, qualified: &str) -> Result<FieldId> {
    let Some((class, field)) = qualified.rsplit_once('.') else {
        bail!("field reference {qualified} is not of the form Class.field");
    };
    let class = lookup_class(program, class, qualified)?;
    program
        .lookup_field(class, field)
        .with_context(|| format!("unknown field {qualified}"))
}

fn parse_type(program: &Program, name: &str) -> Type {
    let name = name.trim();
    if let Some(element) = name.strip_suffix("[]") {
        return Type::Array(Box::new(parse_type(program, element)));
    }
    if PRIMITIVES.contains(&name) {
        return Type::Primitive(name.to_string());
    }
    match program.class_by_name(name) {
        Some(class) => Type::Class(class),
        None => Type::Unknown(name.to_string()),
    }
}

fn normalize_signature(signature: &str) -> String {
    signature.chars().filter(|c| !c.is_whitespace()).collect()
}
