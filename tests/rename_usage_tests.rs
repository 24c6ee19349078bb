//! Rename sessions exercising overriders, shadowing locals and references
//! that resolve through a helper symbol.

#[cfg(test)]
mod tests {
    use cascade::apply::SymbolStatus;
    use cascade::conflict::{ConflictSubject, Severity};
    use cascade::graph::{Manifest, MemoryGraph, SymbolGraph};
    use cascade::search::NoProgress;
    use cascade::session::{begin_session, AutoDecider, SessionRequest, SessionState};
    use cascade::symbol::SymbolId;
    use cascade::usage::Usage;
    use cascade::EngineConfig;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn build(manifest: Value, sources: &[(&str, &str)]) -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(manifest).expect("Failed to parse manifest");
        let sources: BTreeMap<String, String> = sources
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new())
            .expect("Failed to build graph")
    }

    fn proceed() -> AutoDecider {
        AutoDecider {
            proceed_on_conflicts: true,
            accept_cascades: true,
        }
    }

    const BASE: &str = "package demo;

public class Base {
    public void run() {
    }
}
";

    const SUB: &str = "package demo;

public class Sub extends Base {
    @Override
    public void run() {
    }
}
";

    const USER: &str = "package demo;

public class User {
    void go(Sub s, Base b) {
        s.run();
        b.run();
    }
}
";

    const BASE_RUN: SymbolId = SymbolId(2);
    const SUB_RUN: SymbolId = SymbolId(4);

    /// `s.run()` is bound to `Sub.run`, `b.run()` to `Base.run`.
    fn overrider_fixture() -> MemoryGraph {
        build(
            json!({
                "sources": ["src/demo/Base.java", "src/demo/Sub.java", "src/demo/User.java"],
                "symbols": [
                    {"id": 1, "name": "Base", "kind": "class", "file": "src/demo/Base.java",
                     "decl": {"from": "public class Base", "to": "\n}"}, "package": "demo",
                     "modifiers": {"visibility": "public"}},
                    {"id": 2, "name": "run", "kind": "method", "container": 1,
                     "decl": {"from": "public void run()", "to": "\n    }"},
                     "modifiers": {"visibility": "public"}},
                    {"id": 3, "name": "Sub", "kind": "class", "file": "src/demo/Sub.java",
                     "decl": {"from": "public class Sub", "to": "\n}"}, "package": "demo",
                     "supers": [1], "modifiers": {"visibility": "public"}},
                    {"id": 4, "name": "run", "kind": "method", "container": 3,
                     "decl": {"from": "public void run()", "to": "\n    }"}, "overrides": 2,
                     "modifiers": {"visibility": "public"}},
                    {"id": 5, "name": "User", "kind": "class", "file": "src/demo/User.java",
                     "decl": {"from": "public class User", "to": "\n}"}, "package": "demo",
                     "modifiers": {"visibility": "public"}},
                    {"id": 6, "name": "go", "kind": "method", "container": 5,
                     "decl": {"from": "void go", "to": "\n    }"}, "signature": ["Sub", "Base"]}
                ],
                "references": [
                    {"target": 4, "file": "src/demo/User.java", "at": {"text": "s.run();"},
                     "qualifier": {"text": "s", "class": 3}},
                    {"target": 2, "file": "src/demo/User.java", "at": {"text": "b.run();"},
                     "qualifier": {"text": "b", "class": 1}},
                    {"target": 1, "file": "src/demo/Sub.java", "at": {"text": "extends Base"}}
                ]
            }),
            &[
                ("src/demo/Base.java", BASE),
                ("src/demo/Sub.java", SUB),
                ("src/demo/User.java", USER),
            ],
        )
    }

    #[test]
    fn test_calls_bound_to_overrider_are_collected() {
        let graph = overrider_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            SessionRequest::rename(BASE_RUN, "execute"),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();

        let usages = session.usages();
        assert!(usages.iter().all(|u| u.symbol() == BASE_RUN));
        let mut kinds: Vec<&str> = usages.iter().map(Usage::kind_name).collect();
        kinds.sort_unstable();
        assert_eq!(kinds, vec!["overriding", "structural", "structural"]);

        let entry = session
            .conflicts()
            .get(&ConflictSubject::Symbol(BASE_RUN))
            .expect("overriding is reported");
        assert_eq!(
            entry.reasons,
            vec!["method Base.run() is overridden by method Sub.run()".to_string()]
        );
    }

    #[test]
    fn test_method_rename_follows_overrider_call_sites() {
        let mut graph = overrider_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            SessionRequest::rename(BASE_RUN, "execute"),
        )
        .expect("Failed to begin session");
        let state = session
            .drive(&mut graph, &mut proceed(), &NoProgress)
            .expect("Failed to drive session");
        assert_eq!(state, SessionState::Done);

        let outcome = session.result().and_then(|r| r.outcome(BASE_RUN)).unwrap();
        // Two calls, the overrider and the declaration.
        assert_eq!(outcome.status, SymbolStatus::Applied { edits: 4 });

        let user = graph.file_content("src/demo/User.java").unwrap();
        assert!(user.contains("s.execute();"), "{}", user);
        assert!(user.contains("b.execute();"), "{}", user);
        assert!(!user.contains("run"));
        let sub = graph.file_content("src/demo/Sub.java").unwrap();
        assert!(sub.contains("public void execute() {"));
        assert_eq!(graph.resolve(SUB_RUN).unwrap().name, "execute");
    }

    const TAG: &str = "package demo;

public class Tag {
    String label = \"\";

    String show() {
        String text = \"tag\";
        return text + label;
    }
}
";

    const LABEL: SymbolId = SymbolId(2);

    fn shadowing_fixture() -> MemoryGraph {
        build(
            json!({
                "sources": ["src/demo/Tag.java"],
                "symbols": [
                    {"id": 1, "name": "Tag", "kind": "class", "file": "src/demo/Tag.java",
                     "decl": {"from": "public class Tag", "to": "\n}"}, "package": "demo",
                     "modifiers": {"visibility": "public"}},
                    {"id": 2, "name": "label", "kind": "field", "container": 1,
                     "decl": {"text": "String label = \"\";"}, "type": "String"},
                    {"id": 3, "name": "show", "kind": "method", "container": 1,
                     "decl": {"from": "String show()", "to": "\n    }"}},
                    {"id": 4, "name": "text", "kind": "variable", "container": 3,
                     "decl": {"text": "String text = \"tag\";"}, "type": "String"}
                ],
                "references": [
                    {"target": 2, "file": "src/demo/Tag.java", "at": {"text": "+ label;"}},
                    {"target": 4, "file": "src/demo/Tag.java", "at": {"text": "return text"}}
                ]
            }),
            &[("src/demo/Tag.java", TAG)],
        )
    }

    #[test]
    fn test_local_variable_shadowing_new_name_is_a_conflict() {
        let mut graph = shadowing_fixture();
        let before = graph.fingerprint();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            SessionRequest::rename(LABEL, "text"),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();

        let entries = session.conflicts().entries();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].subject, ConflictSubject::Location(_)));
        assert_eq!(
            entries[0].reasons,
            vec!["Renamed field Tag.label would be shadowed by local variable text in method Tag.show()".to_string()]
        );
        assert_eq!(entries[0].severity, Severity::Error);

        session.confirm(false).unwrap();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.run(&mut graph, &NoProgress).is_err());
        assert_eq!(graph.fingerprint(), before);
    }

    #[test]
    fn test_name_without_local_is_not_shadowed() {
        let graph = shadowing_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            SessionRequest::rename(LABEL, "caption"),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();
        assert!(session.conflicts().is_empty());
    }

    const POINT: &str = "package demo;

public record Point(int x) {
}
";

    const CANVAS: &str = "package demo;

public class Canvas {
    int width(Point p) {
        return p.x() * 2;
    }
}
";

    const COMPONENT: SymbolId = SymbolId(2);
    const ACCESSOR: SymbolId = SymbolId(3);

    /// `p.x()` names the record component but resolves to its implicit
    /// accessor.
    fn record_fixture() -> MemoryGraph {
        build(
            json!({
                "sources": ["src/demo/Point.java", "src/demo/Canvas.java"],
                "symbols": [
                    {"id": 1, "name": "Point", "kind": "class", "file": "src/demo/Point.java",
                     "decl": {"from": "public record Point", "to": "\n}"}, "package": "demo",
                     "modifiers": {"visibility": "public"}},
                    {"id": 2, "name": "x", "kind": "field", "container": 1,
                     "decl": {"text": "int x"}, "type": "int"},
                    {"id": 3, "name": "x", "kind": "method", "container": 1,
                     "decl": {"text": "int x"}, "modifiers": {"visibility": "public"}},
                    {"id": 4, "name": "Canvas", "kind": "class", "file": "src/demo/Canvas.java",
                     "decl": {"from": "public class Canvas", "to": "\n}"}, "package": "demo",
                     "modifiers": {"visibility": "public"}},
                    {"id": 5, "name": "width", "kind": "method", "container": 4,
                     "decl": {"from": "int width", "to": "\n    }"}, "signature": ["Point"]}
                ],
                "references": [
                    {"target": 2, "via": 3, "file": "src/demo/Canvas.java", "at": {"text": "p.x()"},
                     "qualifier": {"text": "p", "class": 1}}
                ]
            }),
            &[("src/demo/Point.java", POINT), ("src/demo/Canvas.java", CANVAS)],
        )
    }

    #[test]
    fn test_reference_through_helper_is_related_and_renamed() {
        let mut graph = record_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            SessionRequest::rename(COMPONENT, "left"),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();

        let usages = session.usages();
        assert_eq!(usages.len(), 1);
        assert!(matches!(
            &usages[0],
            Usage::Related { symbol, referenced, .. }
                if *symbol == COMPONENT && *referenced == ACCESSOR
        ));
        assert_eq!(usages[0].kind_name(), "related");
        assert!(session.conflicts().is_empty());

        let state = session
            .drive(&mut graph, &mut proceed(), &NoProgress)
            .expect("Failed to drive session");
        assert_eq!(state, SessionState::Done);
        let outcome = session.result().and_then(|r| r.outcome(COMPONENT)).unwrap();
        assert_eq!(outcome.status, SymbolStatus::Applied { edits: 2 });

        let canvas = graph.file_content("src/demo/Canvas.java").unwrap();
        assert!(canvas.contains("return p.left() * 2;"));
        let point = graph.file_content("src/demo/Point.java").unwrap();
        assert!(point.contains("public record Point(int left) {"));
    }
}
