use std::fmt;

use serde::Serialize;

use crate::builder::{BuildOutput, BuildStats};
use crate::ir::{CallKind, MethodRef, Program};
use crate::variant::Variant;

/// Serializable view of a finished call graph with methods named.
#[derive(Clone, Debug, Serialize)]
pub struct CallGraphReport {
    pub variant: Variant,
    pub entry: String,
    pub reachable_methods: Vec<String>,
    pub edges: Vec<EdgeReport>,
    pub dispatched: Vec<DispatchReport>,
    pub stats: BuildStats,
}

/// One call edge in a [`CallGraphReport`].
#[derive(Clone, Debug, Serialize)]
pub struct EdgeReport {
    pub caller: String,
    pub call_site: u32,
    pub kind: CallKind,
    pub callee: String,
}

/// Implementations linked for one virtual or interface target.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchReport {
    pub target: String,
    pub callees: Vec<String>,
}

impl CallGraphReport {
    pub fn new(program: &Program, variant: Variant, output: &BuildOutput) -> Self {
        let graph = &output.graph;
        let reachable_methods = graph
            .reachable_methods()
            .iter()
            .map(|method| program.method_name(*method))
            .collect();
        let edges = graph
            .edges()
            .map(|edge| EdgeReport {
                caller: program.method_name(edge.caller()),
                call_site: edge.call_site.index,
                kind: edge.kind,
                callee: program.method_name(edge.callee),
            })
            .collect();
        let dispatched = output
            .dispatched
            .iter()
            .map(|(target, callees)| DispatchReport {
                target: target_name(program, target),
                callees: callees.iter().map(|callee| program.method_name(*callee)).collect(),
            })
            .collect();
        Self {
            variant,
            entry: program.method_name(graph.entry()),
            reachable_methods,
            edges,
            dispatched,
            stats: output.stats,
        }
    }

    /// One `caller#site -[kind]-> callee` line per edge.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallGraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edge in &self.edges {
            writeln!(
                f,
                "{}#{} -[{}]-> {}",
                edge.caller, edge.call_site, edge.kind, edge.callee
            )?;
        }
        Ok(())
    }
}

fn target_name(program: &Program, target: &MethodRef) -> String {
    format!("{}.{}", program.class(target.class).name, program.member(target.member))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::ClassHierarchy;
    use crate::testing::Fixture;

    #[test]
    fn report_names_methods_and_edges() {
        let mut fixture = Fixture::new();
        let main = fixture.main();
        let main_class = fixture.program.method(main).class;
        fixture.static_method(main_class, "helper", &[], None);
        fixture.invoke(main, CallKind::Static, main_class, "helper()");

        let hierarchy = ClassHierarchy::new(&fixture.program);
        let output = Variant::Rta.build(&hierarchy, main).expect("build");
        let report = CallGraphReport::new(&fixture.program, Variant::Rta, &output);

        assert_eq!("Main.main()", report.entry);
        assert_eq!(vec!["Main.main()", "Main.helper()"], report.reachable_methods);
        assert_eq!("Main.main()#0 -[static]-> Main.helper()\n", report.to_text());

        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["variant"], "rta");
        assert_eq!(value["edges"][0]["kind"], "static");
        assert_eq!(value["edges"][0]["call_site"], 0);
        assert_eq!(value["stats"]["methods_processed"], 2);
        assert_eq!(value["dispatched"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn report_lists_linked_implementations_per_target() {
        let mut fixture = Fixture::new();
        let shape = fixture.interface("Shape");
        fixture.abstract_method(shape, "area", &[], None);
        let circle = fixture.implementing("Circle", shape);
        fixture.method(circle, "area", &[], None);
        let square = fixture.implementing("Square", shape);
        fixture.method(square, "area", &[], None);
        let main = fixture.main();
        fixture.new_object(main, circle);
        fixture.invoke(main, CallKind::Interface, shape, "area()");

        let hierarchy = ClassHierarchy::new(&fixture.program);
        let xta = Variant::Xta.build(&hierarchy, main).expect("build");
        let report = CallGraphReport::new(&fixture.program, Variant::Xta, &xta);
        assert_eq!(1, report.dispatched.len());
        assert_eq!("Shape.area()", report.dispatched[0].target);
        assert_eq!(vec!["Circle.area()"], report.dispatched[0].callees);
        assert_eq!(1, report.stats.dispatched_callees);

        let cha = Variant::Cha.build(&hierarchy, main).expect("build");
        let report = CallGraphReport::new(&fixture.program, Variant::Cha, &cha);
        assert_eq!(
            vec!["Circle.area()", "Square.area()"],
            report.dispatched[0].callees
        );
        assert_eq!(
            "Main.main()#1 -[interface]-> Circle.area()\nMain.main()#1 -[interface]-> Square.area()\n",
            report.to_string()
        );
    }
}
