//! 集成测试 - 脚本缓存

mod common;

use common::{plain_config, Harness};
use hotbuild::{PrecompileStatus, ScriptError};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_identical_submission_compiles_once() {
    let h = Harness::new(plain_config());
    let scripts = h.engine.scripts();
    let imports = vec!["Terraria.ID".to_string(), "System.Text".to_string()];

    assert_eq!(
        scripts.precompile("Welcome", "return ctx;", &imports).unwrap(),
        PrecompileStatus::Compiled
    );
    let reordered = vec!["System.Text".to_string(), "Terraria.ID".to_string()];
    assert_eq!(
        scripts.precompile("welcome", "return ctx;", &reordered).unwrap(),
        PrecompileStatus::Cached
    );
    assert_eq!(h.service.script_calls(), 1);
}

#[test]
fn test_changed_source_is_never_served_stale() {
    let h = Harness::new(plain_config());
    let scripts = h.engine.scripts();

    scripts.precompile("s", "return 1;", &[]).unwrap();
    let before = scripts.entry("s").unwrap().content_hash;
    assert_eq!(
        scripts.precompile("s", "return 2;", &[]).unwrap(),
        PrecompileStatus::Compiled
    );
    assert_ne!(scripts.entry("s").unwrap().content_hash, before);
    assert_eq!(h.service.script_calls(), 2);
    assert_eq!(h.service.script_requests()[1].source, "return 2;");
}

#[test]
fn test_run_unknown_script_is_not_compiled() {
    let h = Harness::new(plain_config());
    let err = h
        .engine
        .scripts()
        .run("never", json!({}), Duration::from_millis(100))
        .unwrap_err();
    assert!(matches!(err, ScriptError::NotCompiled { ref name } if name == "never"));
}

#[test]
fn test_run_passes_context() {
    let h = Harness::new(plain_config());
    let scripts = h.engine.scripts();
    scripts.precompile("greet", "return ctx;", &[]).unwrap();

    let value = scripts
        .run("greet", json!({"player": "Ada"}), Duration::from_secs(5))
        .unwrap();
    assert_eq!(value["context"]["player"], "Ada");
}

#[tokio::test]
async fn test_async_timeout_keeps_entry_usable() {
    let h = Harness::new(plain_config());
    let scripts = h.engine.scripts();
    scripts
        .precompile("slow", "Thread.Sleep(200); return 1;", &[])
        .unwrap();

    let err = scripts
        .run_async("slow", json!({}), Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Timeout { .. }));
    assert!(scripts.contains("slow"));

    let value = scripts
        .run_async("slow", json!("again"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(value["context"], "again");
}

#[test]
fn test_compile_failure_reports_diagnostics_and_keeps_cache() {
    let h = Harness::new(plain_config());
    let scripts = h.engine.scripts();

    let err = scripts.precompile("bad", "#error broken", &[]).unwrap_err();
    match err {
        ScriptError::Compile { name, diagnostics } => {
            assert_eq!(name, "bad");
            assert_eq!(diagnostics.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(scripts.is_empty());
}

#[test]
fn test_script_and_build_share_references() {
    let h = Harness::new(plain_config());
    h.source("a.cs", "namespace Foo { class A {} }");

    h.engine.orchestrator().build().unwrap();
    h.engine.scripts().precompile("s", "return 1;", &[]).unwrap();

    let build_refs = &h.service.emitted_requests()[0].references;
    let script_refs = &h.service.script_requests()[0].references;
    assert_eq!(build_refs, script_refs);
    assert!(!h.engine.orchestrator().references().is_cached());
}
