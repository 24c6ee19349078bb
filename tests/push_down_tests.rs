//! Integration tests for push-down sessions.

#[cfg(test)]
mod tests {
    use cascade::apply::SymbolStatus;
    use cascade::conflict::{ConflictSubject, Severity};
    use cascade::graph::{Manifest, MemoryGraph, SymbolGraph};
    use cascade::search::NoProgress;
    use cascade::session::{begin_session, AutoDecider, PushDownSettings, SessionRequest, SessionState};
    use cascade::symbol::SymbolId;
    use cascade::{CascadeError, EngineConfig};
    use serde_json::json;
    use std::collections::BTreeMap;

    const A: &str = "package demo;

public class A {
    public void m() {
        System.out.println(\"A\");
    }
}
";

    const B: &str = "package demo;

public class B extends A {
    public void m() {
        System.out.println(\"B\");
    }
}
";

    /// `A.m` pushed into `B`, which already overrides it.
    fn collision_fixture() -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(json!({
            "sources": ["src/demo/A.java", "src/demo/B.java"],
            "symbols": [
                {"id": 1, "name": "A", "kind": "class", "file": "src/demo/A.java",
                 "decl": {"from": "public class A", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 2, "name": "m", "kind": "method", "container": 1,
                 "decl": {"from": "public void m()", "to": "\n    }"},
                 "modifiers": {"visibility": "public"}},
                {"id": 3, "name": "B", "kind": "class", "file": "src/demo/B.java",
                 "decl": {"from": "public class B", "to": "\n}"}, "package": "demo",
                 "supers": [1], "modifiers": {"visibility": "public"}},
                {"id": 4, "name": "m", "kind": "method", "container": 3,
                 "decl": {"from": "public void m()", "to": "\n    }"}, "overrides": 2,
                 "modifiers": {"visibility": "public"}}
            ],
            "references": [
                {"target": 1, "file": "src/demo/B.java", "at": {"text": "extends A"}}
            ]
        }))
        .expect("Failed to parse manifest");
        let sources = BTreeMap::from([
            ("src/demo/A.java".to_string(), A.to_string()),
            ("src/demo/B.java".to_string(), B.to_string()),
        ]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new())
            .expect("Failed to build graph")
    }

    const SHAPE: &str = "package demo;

public class Shape {
    double scale = 1.0;

    public double area() {
        return 0.0;
    }
}
";

    const CIRCLE: &str = "package demo;

public class Circle extends Shape {
    double radius;
}
";

    const SQUARE: &str = "package demo;

public class Square extends Shape {
    double side;
}
";

    const CANVAS: &str = "package demo;

public class Canvas {
    double total(Shape shape) {
        return shape.area();
    }
}
";

    const SHAPE_ID: SymbolId = SymbolId(1);
    const SCALE: SymbolId = SymbolId(2);
    const AREA: SymbolId = SymbolId(3);
    const CIRCLE_ID: SymbolId = SymbolId(4);
    const SQUARE_ID: SymbolId = SymbolId(5);
    const CANVAS_ID: SymbolId = SymbolId(6);

    fn shapes_fixture() -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(json!({
            "sources": [
                "src/demo/Shape.java", "src/demo/Circle.java",
                "src/demo/Square.java", "src/demo/Canvas.java"
            ],
            "symbols": [
                {"id": 1, "name": "Shape", "kind": "class", "file": "src/demo/Shape.java",
                 "decl": {"from": "public class Shape", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 2, "name": "scale", "kind": "field", "container": 1,
                 "decl": {"text": "double scale = 1.0;"}, "type": "double"},
                {"id": 3, "name": "area", "kind": "method", "container": 1,
                 "decl": {"from": "public double area()", "to": "\n    }"},
                 "modifiers": {"visibility": "public"}},
                {"id": 4, "name": "Circle", "kind": "class", "file": "src/demo/Circle.java",
                 "decl": {"from": "public class Circle", "to": "\n}"}, "package": "demo",
                 "supers": [1], "modifiers": {"visibility": "public"}},
                {"id": 5, "name": "Square", "kind": "class", "file": "src/demo/Square.java",
                 "decl": {"from": "public class Square", "to": "\n}"}, "package": "demo",
                 "supers": [1], "modifiers": {"visibility": "public"}},
                {"id": 6, "name": "Canvas", "kind": "class", "file": "src/demo/Canvas.java",
                 "decl": {"from": "public class Canvas", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 7, "name": "total", "kind": "method", "container": 6,
                 "decl": {"from": "double total", "to": "\n    }"}, "signature": ["Shape"]}
            ],
            "references": [
                {"target": 3, "file": "src/demo/Canvas.java", "at": {"text": "shape.area()"},
                 "qualifier": {"text": "shape", "class": 1}},
                {"target": 1, "file": "src/demo/Circle.java", "at": {"text": "extends Shape"}},
                {"target": 1, "file": "src/demo/Square.java", "at": {"text": "extends Shape"}},
                {"target": 1, "file": "src/demo/Canvas.java", "at": {"text": "(Shape shape"}}
            ]
        }))
        .expect("Failed to parse manifest");
        let sources = BTreeMap::from([
            ("src/demo/Shape.java".to_string(), SHAPE.to_string()),
            ("src/demo/Circle.java".to_string(), CIRCLE.to_string()),
            ("src/demo/Square.java".to_string(), SQUARE.to_string()),
            ("src/demo/Canvas.java".to_string(), CANVAS.to_string()),
        ]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new())
            .expect("Failed to build graph")
    }

    fn push_down(member: SymbolId, targets: &[SymbolId], keep_abstract: bool) -> SessionRequest {
        SessionRequest::push_down(
            member,
            PushDownSettings {
                targets: targets.to_vec(),
                keep_abstract,
            },
        )
    }

    /// Pushing `A.m` into `B` collides with `B.m`: one error conflict keyed
    /// by the existing member, and nothing is touched before confirmation.
    #[test]
    fn test_collision_with_existing_override() {
        let graph = collision_fixture();
        let before = graph.fingerprint();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(SymbolId(2), &[SymbolId(3)], false),
        )
        .expect("Failed to begin session");

        session.collect(&graph, &NoProgress).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingConfirmation);
        assert!(session.usages().is_empty());

        let conflicts = session.conflicts();
        assert_eq!(conflicts.len(), 1);
        let entry = conflicts
            .get(&ConflictSubject::Symbol(SymbolId(4)))
            .expect("conflict keyed by B.m");
        assert_eq!(entry.reasons, vec!["method A.m() is already overridden in class B".to_string()]);
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(graph.fingerprint(), before);

        session.confirm(false).unwrap();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(graph.fingerprint(), before);
    }

    #[test]
    fn test_push_down_method_keeping_abstract_declaration() {
        let mut graph = shapes_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(AREA, &[CIRCLE_ID, SQUARE_ID], true),
        )
        .expect("Failed to begin session");

        session.collect(&graph, &NoProgress).unwrap();
        assert_eq!(session.usages().len(), 1);

        // `shape.area()` reads through a Shape, which neither target is.
        let conflicts = session.conflicts();
        assert_eq!(conflicts.len(), 1);
        let entry = conflicts
            .get(&ConflictSubject::Symbol(SHAPE_ID))
            .expect("warning keyed by the accessing class");
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(
            entry.reasons,
            vec![
                "Method Shape.area() pushed down to class Circle will not be visible from certain call sites".to_string(),
                "Method Shape.area() pushed down to class Square will not be visible from certain call sites".to_string(),
            ]
        );

        session.confirm(true).unwrap();
        let candidates = session.propose_cascade(&graph, &NoProgress).unwrap();
        assert!(candidates.is_empty());
        assert_eq!(session.state(), SessionState::Applying);

        let result = session.run(&mut graph, &NoProgress).unwrap().clone();
        assert_eq!(session.state(), SessionState::Done);
        assert!(result.is_complete());
        assert_eq!(
            result.outcome(AREA).map(|o| o.status.clone()),
            Some(SymbolStatus::Applied { edits: 3 })
        );

        let shape = graph.file_content("src/demo/Shape.java").unwrap();
        assert!(shape.contains("    public abstract double area();\n}"));
        let circle = graph.file_content("src/demo/Circle.java").unwrap();
        assert!(circle.contains(
            "    double radius;\n    public double area() {\n        return 0.0;\n    }\n}"
        ));
        let square = graph.file_content("src/demo/Square.java").unwrap();
        assert!(square.contains("    double side;\n    public double area() {"));
        assert_eq!(graph.file_content("src/demo/Canvas.java").unwrap(), CANVAS);

        let copies: Vec<_> = graph
            .members(CIRCLE_ID)
            .into_iter()
            .filter_map(|id| graph.resolve(id))
            .filter(|info| info.name == "area")
            .collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].qualified_name, "Circle.area");
    }

    #[test]
    fn test_push_down_field_removes_it_from_source() {
        let mut graph = shapes_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(SCALE, &[CIRCLE_ID], false),
        )
        .expect("Failed to begin session");

        let state = session
            .drive(&mut graph, &mut AutoDecider::default(), &NoProgress)
            .unwrap();
        assert_eq!(state, SessionState::Done);
        assert!(session.conflicts().is_empty());

        let shape = graph.file_content("src/demo/Shape.java").unwrap();
        assert!(!shape.contains("scale"));
        assert!(shape.contains("public class Shape {\n\n    public double area() {"));
        let circle = graph.file_content("src/demo/Circle.java").unwrap();
        assert!(circle.contains("    double radius;\n    double scale = 1.0;\n}"));
        assert!(graph.resolve(SCALE).is_none());
    }

    /// `area()` reads `scale` itself, so `scale` cannot leave `Shape`.
    fn scale_user_fixture() -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(json!({
            "sources": ["src/demo/Shape.java", "src/demo/Circle.java"],
            "symbols": [
                {"id": 1, "name": "Shape", "kind": "class", "file": "src/demo/Shape.java",
                 "decl": {"from": "public class Shape", "to": "\n}"}, "package": "demo"},
                {"id": 2, "name": "scale", "kind": "field", "container": 1,
                 "decl": {"text": "double scale = 1.0;"}, "type": "double"},
                {"id": 3, "name": "area", "kind": "method", "container": 1,
                 "decl": {"from": "public double area()", "to": "\n    }"},
                 "modifiers": {"visibility": "public"}},
                {"id": 4, "name": "Circle", "kind": "class", "file": "src/demo/Circle.java",
                 "decl": {"from": "public class Circle", "to": "\n}"}, "package": "demo",
                 "supers": [1]}
            ],
            "references": [
                {"target": 2, "file": "src/demo/Shape.java", "at": {"text": "return scale;"}}
            ]
        }))
        .expect("Failed to parse manifest");
        let sources = BTreeMap::from([
            ("src/demo/Shape.java".to_string(), SHAPE.replace("return 0.0;", "return scale;")),
            ("src/demo/Circle.java".to_string(), CIRCLE.to_string()),
        ]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new())
            .expect("Failed to build graph")
    }

    #[test]
    fn test_source_class_user_blocks_removal() {
        let graph = scale_user_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(SCALE, &[CIRCLE_ID], false),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();

        let entry = session
            .conflicts()
            .get(&ConflictSubject::Symbol(AREA))
            .expect("conflict keyed by the using method");
        assert_eq!(
            entry.reasons,
            vec!["Method Shape.area() uses field Shape.scale, which is pushed down".to_string()]
        );
        assert!(session.conflicts().has_errors());
    }

    const BLOB: &str = "package demo;

public class Blob extends Shape {
}
";

    const GALLERY: &str = "package demo;

public class Gallery {
    double sum(Blob blob) {
        return blob.area();
    }
}
";

    const BLOB_ID: SymbolId = SymbolId(8);

    /// `area()` is called through a `Shape` from `Canvas` and through a
    /// `Blob` from `Gallery`; neither class sees a copy pushed into `Circle`.
    fn gallery_fixture() -> MemoryGraph {
        let manifest: Manifest = serde_json::from_value(json!({
            "sources": [
                "src/demo/Shape.java", "src/demo/Circle.java", "src/demo/Blob.java",
                "src/demo/Canvas.java", "src/demo/Gallery.java"
            ],
            "symbols": [
                {"id": 1, "name": "Shape", "kind": "class", "file": "src/demo/Shape.java",
                 "decl": {"from": "public class Shape", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 3, "name": "area", "kind": "method", "container": 1,
                 "decl": {"from": "public double area()", "to": "\n    }"},
                 "modifiers": {"visibility": "public"}},
                {"id": 4, "name": "Circle", "kind": "class", "file": "src/demo/Circle.java",
                 "decl": {"from": "public class Circle", "to": "\n}"}, "package": "demo",
                 "supers": [1], "modifiers": {"visibility": "public"}},
                {"id": 8, "name": "Blob", "kind": "class", "file": "src/demo/Blob.java",
                 "decl": {"from": "public class Blob", "to": "\n}"}, "package": "demo",
                 "supers": [1], "modifiers": {"visibility": "public"}},
                {"id": 6, "name": "Canvas", "kind": "class", "file": "src/demo/Canvas.java",
                 "decl": {"from": "public class Canvas", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 7, "name": "total", "kind": "method", "container": 6,
                 "decl": {"from": "double total", "to": "\n    }"}, "signature": ["Shape"]},
                {"id": 9, "name": "Gallery", "kind": "class", "file": "src/demo/Gallery.java",
                 "decl": {"from": "public class Gallery", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 10, "name": "sum", "kind": "method", "container": 9,
                 "decl": {"from": "double sum", "to": "\n    }"}, "signature": ["Blob"]}
            ],
            "references": [
                {"target": 3, "file": "src/demo/Canvas.java", "at": {"text": "shape.area()"},
                 "qualifier": {"text": "shape", "class": 1}},
                {"target": 3, "file": "src/demo/Gallery.java", "at": {"text": "blob.area()"},
                 "qualifier": {"text": "blob", "class": 8}}
            ]
        }))
        .expect("Failed to parse manifest");
        let sources = BTreeMap::from([
            ("src/demo/Shape.java".to_string(), SHAPE.to_string()),
            ("src/demo/Circle.java".to_string(), CIRCLE.to_string()),
            ("src/demo/Blob.java".to_string(), BLOB.to_string()),
            ("src/demo/Canvas.java".to_string(), CANVAS.to_string()),
            ("src/demo/Gallery.java".to_string(), GALLERY.to_string()),
        ]);
        MemoryGraph::from_manifest(&manifest, &sources, &BTreeMap::new())
            .expect("Failed to build graph")
    }

    #[test]
    fn test_visibility_warning_stops_at_first_call_site_per_target() {
        let graph = gallery_fixture();
        let mut session = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(AREA, &[CIRCLE_ID], true),
        )
        .expect("Failed to begin session");
        session.collect(&graph, &NoProgress).unwrap();
        assert_eq!(session.usages().len(), 2);

        let conflicts = session.conflicts();
        assert_eq!(conflicts.len(), 1);
        let entry = conflicts
            .get(&ConflictSubject::Symbol(SHAPE_ID))
            .expect("warning keyed by the first accessing class");
        assert_eq!(
            entry.reasons,
            vec!["Method Shape.area() pushed down to class Circle will not be visible from certain call sites".to_string()]
        );
        assert!(conflicts.get(&ConflictSubject::Symbol(BLOB_ID)).is_none());
    }

    #[test]
    fn test_target_must_be_a_subclass() {
        let graph = shapes_fixture();
        let err = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(AREA, &[CANVAS_ID], false),
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::InvalidOperation { .. }));

        let err = begin_session(EngineConfig::default(), &graph, push_down(AREA, &[], false))
            .unwrap_err();
        assert!(matches!(err, CascadeError::InvalidOperation { .. }));

        let err = begin_session(
            EngineConfig::default(),
            &graph,
            push_down(SHAPE_ID, &[CIRCLE_ID], false),
        )
        .unwrap_err();
        assert!(matches!(err, CascadeError::InvalidOperation { .. }));
    }
}
