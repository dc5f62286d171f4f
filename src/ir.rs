use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Index of a class in the program arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct ClassId(pub u32);

/// Index of a method in the program arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct MethodId(pub u32);

/// Index of a field in the program arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct FieldId(pub u32);

/// Interned member subsignature such as `toString()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct MemberId(pub u32);

/// A call statement, addressed by its container method and statement index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct CallSiteId {
    pub method: MethodId,
    pub index: u32,
}

/// Intermediate representation for a class or interface.
#[derive(Clone, Debug)]
pub struct Class {
    pub name: String,
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
}

impl Class {
    /// Whether allocation sites may instantiate this class.
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract && !self.is_interface
    }
}

/// Intermediate representation for a method and its statements.
#[derive(Clone, Debug)]
pub struct Method {
    pub class: ClassId,
    pub name: String,
    pub member: MemberId,
    pub params: Vec<Type>,
    pub ret: Option<Type>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub body: Vec<Stmt>,
}

/// Field declaration.
#[derive(Clone, Debug)]
pub struct Field {
    pub class: ClassId,
    pub name: String,
    pub ty: Type,
}

/// Declared type of a parameter, return value or field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Type {
    Primitive(String),
    Class(ClassId),
    Array(Box<Type>),
    /// A reference type whose class is not part of the program.
    Unknown(String),
}

impl Type {
    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Type::Class(class) => Some(*class),
            _ => None,
        }
    }

    /// Innermost element class of an array type, or the class itself.
    pub fn base_class(&self) -> Option<ClassId> {
        match self {
            Type::Array(element) => element.base_class(),
            other => other.as_class(),
        }
    }
}

/// Statement kinds needed for call graph construction.
#[derive(Clone, Debug)]
pub enum Stmt {
    New(ClassId),
    NewArray(Type),
    StoreField(FieldId),
    LoadField(FieldId),
    Invoke(Invoke),
    Other,
}

/// Call statement with its declared target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Invoke {
    pub kind: CallKind,
    pub target: MethodRef,
}

/// Declared call target: the referenced class plus member subsignature.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MethodRef {
    pub class: ClassId,
    pub member: MemberId,
}

/// Call opcode classification deciding how a call site is resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Static,
    Special,
    Virtual,
    Interface,
    Dynamic,
    /// Unrecognised opcode; reaching one aborts construction.
    Other,
}

impl CallKind {
    /// Map an opcode name (`virtual` or `invokevirtual`) to a call kind.
    pub fn from_name(name: &str) -> CallKind {
        let name = name.trim().to_ascii_lowercase();
        match name.strip_prefix("invoke").unwrap_or(&name) {
            "static" => CallKind::Static,
            "special" => CallKind::Special,
            "virtual" => CallKind::Virtual,
            "interface" => CallKind::Interface,
            "dynamic" => CallKind::Dynamic,
            _ => CallKind::Other,
        }
    }

    pub fn is_virtual(self) -> bool {
        matches!(self, CallKind::Virtual | CallKind::Interface)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::Static => "static",
            CallKind::Special => "special",
            CallKind::Virtual => "virtual",
            CallKind::Interface => "interface",
            CallKind::Dynamic => "dynamic",
            CallKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Arena-backed program model: classes, methods, fields and the entry method.
#[derive(Clone, Debug, Default)]
pub struct Program {
    classes: Vec<Class>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    members: Vec<String>,
    member_ids: HashMap<String, MemberId>,
    class_ids: HashMap<String, ClassId>,
    entry: Option<MethodId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a concrete class with no supertypes. Names are unique; re-adding returns the existing id.
    pub fn add_class(&mut self, name: impl Into<String>) -> ClassId {
        let name = name.into();
        if let Some(id) = self.class_ids.get(&name) {
            return *id;
        }
        let id = ClassId(self.classes.len() as u32);
        self.class_ids.insert(name.clone(), id);
        self.classes.push(Class {
            name,
            super_class: None,
            interfaces: Vec::new(),
            is_abstract: false,
            is_interface: false,
            methods: Vec::new(),
            fields: Vec::new(),
        });
        id
    }

    pub fn add_field(&mut self, class: ClassId, name: impl Into<String>, ty: Type) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(Field {
            class,
            name: name.into(),
            ty,
        });
        self.classes[class.0 as usize].fields.push(id);
        id
    }

    /// Add a non-static, non-abstract method with an empty body.
    pub fn add_method(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        params: Vec<Type>,
        ret: Option<Type>,
    ) -> MethodId {
        let name = name.into();
        let param_names: Vec<String> = params.iter().map(|ty| self.type_name(ty)).collect();
        let member = self.intern_member(&format!("{}({})", name, param_names.join(",")));
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(Method {
            class,
            name,
            member,
            params,
            ret,
            is_static: false,
            is_abstract: false,
            body: Vec::new(),
        });
        self.classes[class.0 as usize].methods.push(id);
        id
    }

    /// Append a statement and return its index in the method body.
    pub fn push_stmt(&mut self, method: MethodId, stmt: Stmt) -> u32 {
        let body = &mut self.methods[method.0 as usize].body;
        body.push(stmt);
        (body.len() - 1) as u32
    }

    pub fn intern_member(&mut self, subsignature: &str) -> MemberId {
        if let Some(id) = self.member_ids.get(subsignature) {
            return *id;
        }
        let id = MemberId(self.members.len() as u32);
        self.members.push(subsignature.to_string());
        self.member_ids.insert(subsignature.to_string(), id);
        id
    }

    pub fn set_entry(&mut self, method: MethodId) {
        self.entry = Some(method);
    }

    pub fn entry(&self) -> Option<MethodId> {
        self.entry
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.0 as usize]
    }

    pub fn get_method(&self, id: MethodId) -> Option<&Method> {
        self.methods.get(id.0 as usize)
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    pub fn member(&self, id: MemberId) -> &str {
        &self.members[id.0 as usize]
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len() as u32).map(ClassId)
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_ids.get(name).copied()
    }

    pub fn member_by_name(&self, subsignature: &str) -> Option<MemberId> {
        self.member_ids.get(subsignature).copied()
    }

    /// Look up `Class.name(params)`. Class names may themselves contain dots.
    pub fn method_by_name(&self, qualified: &str) -> Option<MethodId> {
        let open = qualified.find('(')?;
        let dot = qualified[..open].rfind('.')?;
        let class = self.class_by_name(&qualified[..dot])?;
        let member = self.member_by_name(&qualified[dot + 1..])?;
        self.class(class)
            .methods
            .iter()
            .copied()
            .find(|method| self.method(*method).member == member)
    }

    /// Resolve a field named on `class`, searching superclasses the way field references do.
    pub fn lookup_field(&self, class: ClassId, name: &str) -> Option<FieldId> {
        let mut current = Some(class);
        while let Some(class) = current {
            let declared = self.class(class);
            if let Some(field) = declared
                .fields
                .iter()
                .copied()
                .find(|field| self.field(*field).name == name)
            {
                return Some(field);
            }
            current = declared.super_class;
        }
        None
    }

    pub fn invoke(&self, site: CallSiteId) -> Option<&Invoke> {
        match self.method(site.method).body.get(site.index as usize) {
            Some(Stmt::Invoke(invoke)) => Some(invoke),
            _ => None,
        }
    }

    pub fn call_sites_in(&self, method: MethodId) -> impl Iterator<Item = (CallSiteId, &Invoke)> + '_ {
        self.method(method)
            .body
            .iter()
            .enumerate()
            .filter_map(move |(index, stmt)| match stmt {
                Stmt::Invoke(invoke) => Some((
                    CallSiteId {
                        method,
                        index: index as u32,
                    },
                    invoke,
                )),
                _ => None,
            })
    }

    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Primitive(name) | Type::Unknown(name) => name.clone(),
            Type::Class(class) => self.class(*class).name.clone(),
            Type::Array(element) => format!("{}[]", self.type_name(element)),
        }
    }

    /// Fully qualified `Class.name(params)` of a method.
    pub fn method_name(&self, id: MethodId) -> String {
        let method = self.method(id);
        format!("{}.{}", self.class(method.class).name, self.member(method.member))
    }

    pub fn field_name(&self, id: FieldId) -> String {
        let field = self.field(id);
        format!("{}.{}", self.class(field.class).name, field.name)
    }

    pub fn call_site_name(&self, site: CallSiteId) -> String {
        format!("{}#{}", self.method_name(site.method), site.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_lookup_handles_dotted_class_names() {
        let mut program = Program::new();
        let object = program.add_class("java.lang.Object");
        let string = program.add_class("java.lang.String");
        let method = program.add_method(
            object,
            "equals",
            vec![Type::Class(object)],
            Some(Type::Primitive("boolean".to_string())),
        );
        let array_param = program.add_method(
            string,
            "join",
            vec![Type::Array(Box::new(Type::Class(string)))],
            Some(Type::Class(string)),
        );

        assert_eq!(
            Some(method),
            program.method_by_name("java.lang.Object.equals(java.lang.Object)")
        );
        assert_eq!(
            Some(array_param),
            program.method_by_name("java.lang.String.join(java.lang.String[])")
        );
        assert_eq!(None, program.method_by_name("java.lang.Object.hashCode()"));
        assert_eq!(None, program.method_by_name("nonsense"));
    }

    #[test]
    fn members_are_interned_once() {
        let mut program = Program::new();
        let a = program.add_class("A");
        let b = program.add_class("B");
        let first = program.add_method(a, "run", Vec::new(), None);
        let second = program.add_method(b, "run", Vec::new(), None);

        assert_eq!(program.method(first).member, program.method(second).member);
        assert_eq!("run()", program.member(program.method(first).member));
        assert_eq!(a, program.add_class("A"));
    }

    #[test]
    fn field_lookup_walks_superclasses() {
        let mut program = Program::new();
        let base = program.add_class("Base");
        let derived = program.add_class("Derived");
        program.class_mut(derived).super_class = Some(base);
        let field = program.add_field(base, "value", Type::Class(base));

        assert_eq!(Some(field), program.lookup_field(derived, "value"));
        assert_eq!(None, program.lookup_field(base, "missing"));
        assert_eq!("Base.value", program.field_name(field));
    }

    #[test]
    fn call_sites_are_addressed_by_statement_index() {
        let mut program = Program::new();
        let a = program.add_class("A");
        let run = program.add_method(a, "run", Vec::new(), None);
        let target = MethodRef {
            class: a,
            member: program.method(run).member,
        };
        program.push_stmt(run, Stmt::New(a));
        program.push_stmt(
            run,
            Stmt::Invoke(Invoke {
                kind: CallKind::Virtual,
                target,
            }),
        );

        let sites: Vec<CallSiteId> = program.call_sites_in(run).map(|(site, _)| site).collect();
        assert_eq!(vec![CallSiteId { method: run, index: 1 }], sites);
        assert!(program.invoke(CallSiteId { method: run, index: 0 }).is_none());
        assert_eq!("A.run()#1", program.call_site_name(sites[0]));
    }

    #[test]
    fn call_kinds_accept_opcode_names() {
        assert_eq!(CallKind::Virtual, CallKind::from_name("invokevirtual"));
        assert_eq!(CallKind::Interface, CallKind::from_name("Interface"));
        assert_eq!(CallKind::Dynamic, CallKind::from_name("invokedynamic"));
        assert_eq!(CallKind::Other, CallKind::from_name("invokehandle"));
        assert!(CallKind::Interface.is_virtual());
        assert!(!CallKind::Special.is_virtual());
    }
}
