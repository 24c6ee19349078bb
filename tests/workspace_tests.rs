//! Workspace loading, persisting and plan execution against real directories.

#[cfg(test)]
mod tests {
    use cascade::graph::{load_workspace, lookup, SymbolGraph, MANIFEST_FILE};
    use cascade::plan::{execute_plan, run_step, PlanStep};
    use cascade::session::SessionState;
    use cascade::symbol::SymbolId;
    use cascade::{CascadeError, EngineSettings};
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const COUNTER: &str = "package demo;

public class Counter {
    int count = 0;

    int next() {
        return count + 1;
    }
}
";

    const REPORT: &str = "package demo;

public class Report {
    String render(Counter counter) {
        return \"total \" + counter.count;
    }
}
";

    const NOTES: &str = "The Counter class keeps a count.\n";

    fn write_workspace(root: &Path) {
        let manifest = json!({
            "sources": ["src/demo/Counter.java", "src/demo/Report.java"],
            "text_files": ["docs/*.md"],
            "symbols": [
                {"id": 1, "name": "Counter", "kind": "class", "file": "src/demo/Counter.java",
                 "decl": {"from": "public class Counter", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 2, "name": "count", "kind": "field", "container": 1,
                 "decl": {"text": "int count = 0;"}, "type": "int"},
                {"id": 3, "name": "next", "kind": "method", "container": 1,
                 "decl": {"from": "int next()", "to": "\n    }"}},
                {"id": 4, "name": "Report", "kind": "class", "file": "src/demo/Report.java",
                 "decl": {"from": "public class Report", "to": "\n}"}, "package": "demo",
                 "modifiers": {"visibility": "public"}},
                {"id": 5, "name": "render", "kind": "method", "container": 4,
                 "decl": {"from": "String render", "to": "\n    }"}, "signature": ["Counter"]},
                {"id": 6, "name": "counter", "kind": "variable", "container": 5,
                 "decl": {"text": "Counter counter"}, "type": "Counter"}
            ],
            "references": [
                {"target": 2, "file": "src/demo/Counter.java", "at": {"text": "return count + 1;"}},
                {"target": 2, "file": "src/demo/Report.java", "at": {"text": "counter.count"},
                 "qualifier": {"text": "counter", "class": 1}},
                {"target": 6, "file": "src/demo/Report.java", "at": {"text": "counter.count"}},
                {"target": 1, "file": "src/demo/Report.java", "at": {"text": "(Counter counter"}}
            ]
        });
        fs::create_dir_all(root.join("src/demo")).expect("Failed to create source dir");
        fs::create_dir_all(root.join("docs")).expect("Failed to create docs dir");
        fs::write(root.join("src/demo/Counter.java"), COUNTER).expect("Failed to write Counter");
        fs::write(root.join("src/demo/Report.java"), REPORT).expect("Failed to write Report");
        fs::write(root.join("docs/notes.md"), NOTES).expect("Failed to write notes");
        fs::write(
            root.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).expect("Failed to serialize manifest"),
        )
        .expect("Failed to write manifest");
    }

    fn rename(symbol: &str, to: &str) -> PlanStep {
        PlanStep {
            op: "rename".to_string(),
            symbol: symbol.to_string(),
            to: Some(to.to_string()),
            ..PlanStep::default()
        }
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn test_load_workspace_reads_sources_and_text_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());

        let graph = load_workspace(dir.path()).expect("Failed to load workspace");
        assert_eq!(graph.root(), Some(dir.path()));
        let files: Vec<&str> = graph.files().collect();
        assert!(files.contains(&"src/demo/Counter.java"));
        assert!(files.contains(&"docs/notes.md"));
        assert!(!files.contains(&MANIFEST_FILE));
        assert_eq!(lookup(&graph, "Counter.count").unwrap(), SymbolId(2));
        assert_eq!(lookup(&graph, "Report.render.counter").unwrap(), SymbolId(6));
    }

    #[test]
    fn test_missing_manifest_is_an_io_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let err = load_workspace(dir.path()).unwrap_err();
        assert!(matches!(err, CascadeError::Io { .. }));
    }

    #[test]
    fn test_class_rename_persists_files_and_manifest() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());

        let mut graph = load_workspace(dir.path()).expect("Failed to load workspace");
        let step = PlanStep {
            search_text_occurrences: true,
            ..rename("Counter", "Tally")
        };
        let report = run_step(&mut graph, &EngineSettings::default(), &step).unwrap();
        assert_eq!(report.state, SessionState::Done);
        // The parameter `counter` would become `tally`, but cascades were not accepted.
        assert_eq!(report.renames.len(), 1);

        let summaries = graph.persist().expect("Failed to persist");
        let written: Vec<&str> = summaries.iter().map(|s| s.file.as_str()).collect();
        assert!(written.contains(&"src/demo/Tally.java"));
        assert!(written.contains(&"src/demo/Report.java"));
        assert!(written.contains(&"docs/notes.md"));

        let root = dir.path();
        assert!(!root.join("src/demo/Counter.java").exists());
        let tally = fs::read_to_string(root.join("src/demo/Tally.java")).unwrap();
        assert!(tally.contains("public class Tally {"));
        let report_src = fs::read_to_string(root.join("src/demo/Report.java")).unwrap();
        assert!(report_src.contains("String render(Tally counter) {"));
        let notes = fs::read_to_string(root.join("docs/notes.md")).unwrap();
        assert_eq!(notes, "The Tally class keeps a count.\n");

        let tally_summary = summaries
            .iter()
            .find(|s| s.file == "src/demo/Tally.java")
            .unwrap();
        assert_eq!(tally_summary.before_hash, sha256_hex(COUNTER.as_bytes()));
        assert_eq!(tally_summary.after_hash, sha256_hex(tally.as_bytes()));

        // The rewritten manifest loads and still resolves every symbol.
        let reloaded = load_workspace(root).expect("Failed to reload workspace");
        assert_eq!(lookup(&reloaded, "Tally").unwrap(), SymbolId(1));
        assert_eq!(lookup(&reloaded, "Tally.count").unwrap(), SymbolId(2));
        let render = reloaded.resolve(SymbolId(5)).unwrap();
        assert_eq!(render.location.file, "src/demo/Report.java");
    }

    #[test]
    fn test_settings_disable_file_name_sync() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());
        fs::write(dir.path().join(".cascade.json"), r#"{"file_name_sync": false}"#)
            .expect("Failed to write settings");

        let settings = EngineSettings::load(dir.path()).unwrap();
        let mut graph = load_workspace(dir.path()).expect("Failed to load workspace");
        run_step(&mut graph, &settings, &rename("Counter", "Tally")).unwrap();
        graph.persist().expect("Failed to persist");

        let counter = fs::read_to_string(dir.path().join("src/demo/Counter.java")).unwrap();
        assert!(counter.contains("public class Tally {"));
        assert!(!dir.path().join("src/demo/Tally.java").exists());
    }

    #[test]
    fn test_execute_plan_runs_steps_in_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());
        let plan_path = dir.path().join("plan.json");
        fs::write(
            &plan_path,
            r#"{"steps": [
                {"op": "rename", "symbol": "Counter.count", "to": "total"},
                {"op": "rename", "symbol": "Report", "to": "Summary"}
            ]}"#,
        )
        .expect("Failed to write plan");

        let messages = execute_plan(&plan_path, dir.path()).expect("Failed to execute plan");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "rename Counter.count: 1 symbols changed, 2 files written");
        assert_eq!(messages[1], "rename Report: 1 symbols changed, 1 files written");

        let counter = fs::read_to_string(dir.path().join("src/demo/Counter.java")).unwrap();
        assert!(counter.contains("int total = 0;"));
        assert!(counter.contains("return total + 1;"));
        let summary = fs::read_to_string(dir.path().join("src/demo/Summary.java")).unwrap();
        assert!(summary.contains("public class Summary {"));
        assert!(summary.contains("counter.total;"));
        assert!(!dir.path().join("src/demo/Report.java").exists());
    }

    #[test]
    fn test_failed_step_stops_plan_and_keeps_earlier_steps() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());
        let plan_path = dir.path().join("plan.json");
        fs::write(
            &plan_path,
            r#"{"steps": [
                {"op": "rename", "symbol": "Counter.count", "to": "total"},
                {"op": "rename", "symbol": "Counter.missing", "to": "other"},
                {"op": "rename", "symbol": "Report", "to": "Summary"}
            ]}"#,
        )
        .expect("Failed to write plan");

        let err = execute_plan(&plan_path, dir.path()).unwrap_err();
        match err {
            CascadeError::PlanExecutionFailed { step, error } => {
                assert_eq!(step, 2);
                assert!(error.contains("Counter.missing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let counter = fs::read_to_string(dir.path().join("src/demo/Counter.java")).unwrap();
        assert!(counter.contains("int total = 0;"));
        assert!(dir.path().join("src/demo/Report.java").exists());
    }

    #[test]
    fn test_cancelled_step_is_not_persisted() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_workspace(dir.path());
        let plan_path = dir.path().join("plan.json");
        // Package `demo` already has a class named Report.
        fs::write(
            &plan_path,
            r#"{"steps": [{"op": "rename", "symbol": "Counter", "to": "Report"}]}"#,
        )
        .expect("Failed to write plan");

        let err = execute_plan(&plan_path, dir.path()).unwrap_err();
        assert!(matches!(err, CascadeError::PlanExecutionFailed { step: 1, .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("src/demo/Counter.java")).unwrap(),
            COUNTER
        );
    }
}
