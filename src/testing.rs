use crate::ir::{CallKind, CallSiteId, ClassId, FieldId, Invoke, MethodId, MethodRef, Program, Stmt, Type};

/// Small program builder for unit tests.
pub(crate) struct Fixture {
    pub(crate) program: Program,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            program: Program::new(),
        }
    }

    pub(crate) fn class(&mut self, name: &str) -> ClassId {
        self.program.add_class(name)
    }

    pub(crate) fn object(&mut self) -> ClassId {
        self.class("Object")
    }

    pub(crate) fn subclass(&mut self, name: &str, parent: ClassId) -> ClassId {
        let class = self.class(name);
        self.program.class_mut(class).super_class = Some(parent);
        class
    }

    pub(crate) fn interface(&mut self, name: &str) -> ClassId {
        let class = self.class(name);
        self.program.class_mut(class).is_interface = true;
        class
    }

    pub(crate) fn implementing(&mut self, name: &str, iface: ClassId) -> ClassId {
        let class = self.class(name);
        self.program.class_mut(class).interfaces.push(iface);
        class
    }

    /// `Main.main()`, registered as the entry method.
    pub(crate) fn main(&mut self) -> MethodId {
        let class = self.class("Main");
        let main = self.static_method(class, "main", &[], None);
        self.program.set_entry(main);
        main
    }

    pub(crate) fn entry(&self) -> MethodId {
        self.program.entry().expect("fixture has no entry method")
    }

    pub(crate) fn method(&mut self, class: ClassId, name: &str, params: &[ClassId], ret: Option<ClassId>) -> MethodId {
        let params = params.iter().map(|param| Type::Class(*param)).collect();
        self.program.add_method(class, name, params, ret.map(Type::Class))
    }

    pub(crate) fn static_method(
        &mut self,
        class: ClassId,
        name: &str,
        params: &[ClassId],
        ret: Option<ClassId>,
    ) -> MethodId {
        let method = self.method(class, name, params, ret);
        self.program.method_mut(method).is_static = true;
        method
    }

    pub(crate) fn abstract_method(
        &mut self,
        class: ClassId,
        name: &str,
        params: &[ClassId],
        ret: Option<ClassId>,
    ) -> MethodId {
        let method = self.method(class, name, params, ret);
        self.program.method_mut(method).is_abstract = true;
        method
    }

    pub(crate) fn field(&mut self, class: ClassId, name: &str, ty: ClassId) -> FieldId {
        self.program.add_field(class, name, Type::Class(ty))
    }

    pub(crate) fn new_object(&mut self, method: MethodId, class: ClassId) {
        self.program.push_stmt(method, Stmt::New(class));
    }

    pub(crate) fn store(&mut self, method: MethodId, field: FieldId) {
        self.program.push_stmt(method, Stmt::StoreField(field));
    }

    pub(crate) fn load(&mut self, method: MethodId, field: FieldId) {
        self.program.push_stmt(method, Stmt::LoadField(field));
    }

    pub(crate) fn invoke(&mut self, method: MethodId, kind: CallKind, class: ClassId, subsignature: &str) -> CallSiteId {
        let member = self.program.intern_member(subsignature);
        let index = self.program.push_stmt(
            method,
            Stmt::Invoke(Invoke {
                kind,
                target: MethodRef { class, member },
            }),
        );
        CallSiteId { method, index }
    }
}
