//! End-to-end scenarios (SPEC_FULL §8, S1-S6), driving the compiler through
//! its public `driver`/`CompileContext` surface rather than any one stage.

use std::path::Path;

use jpc::driver::{compile_and_write, compile_file, CompileContext};
use jpc::error::CompileError;

fn compile(source: &str) -> String {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.jp");
    std::fs::write(&entry, source).unwrap();
    let mut ctx = CompileContext::new(4);
    compile_file(&entry, &mut ctx).unwrap()
}

#[test]
fn s1_init_block_with_until_loop_lowers_to_vjpi_and_oninit() {
    let out = compile(
        "library Foo:\n    init:\n        int i = 1\n        until i > 5:\n            i++\n",
    );
    assert!(out.contains("library Foo initializer onInit"));
    assert!(out.contains("    globals\n    endglobals\n"), "S1 expects an empty globals block");
    assert!(out.contains("private function VJPI"));
    assert!(out.contains("local integer i"));
    assert!(out.contains("loop"));
    assert!(out.contains("exitwhen i > 5"));
    assert!(out.contains("set i = i + 1"));
    assert!(out.contains("endloop"));
    assert!(out.contains("private function onInit"));
    let vjpi_pos = out.find("function VJPI").unwrap();
    let call_pos = out.rfind("call VJPI").unwrap();
    assert!(vjpi_pos < call_pos, "VJPI function must be defined before onInit calls it in the text");
}

#[test]
fn s2_identical_input_compiles_to_byte_identical_output_across_runs() {
    let source = "library TickLib:\n    init:\n        int tick = 0\n    onTick():\n        tick++\n";
    let out1 = compile(source);
    let out2 = compile(source);
    assert_eq!(out1, out2, "identical input must produce byte-identical output across runs");
    assert!(out1.contains("library TickLib"));
    assert!(out1.contains("function onTick"));
}

#[test]
fn s3_diamond_import_appears_once_in_output() {
    let dir = tempfile::tempdir().unwrap();
    let shared = dir.path().join("shared.jp");
    let via_a = dir.path().join("a.jp");
    let entry = dir.path().join("main.jp");
    std::fs::write(&shared, "library Shared:\n    int x = 1\n").unwrap();
    std::fs::write(&via_a, "import \"shared.jp\"\nlibrary A:\n    int y = 1\n").unwrap();
    std::fs::write(
        &entry,
        "import \"a.jp\"\nimport \"./shared.jp\"\nlibrary Main:\n    int z = 1\n",
    )
    .unwrap();

    let mut ctx = CompileContext::new(4);
    let out = compile_file(&entry, &mut ctx).unwrap();
    let occurrences = out.matches("library Shared").count();
    assert_eq!(occurrences, 1, "a doubly-imported unit must be emitted exactly once");
}

#[test]
fn s4_three_interleaved_locals_hoist_to_prologue_in_order() {
    let out = compile(
        "library Foo:\n    bar():\n        integer a = 1\n        a = a + 1\n        integer b = 2\n        integer c = a + b\n",
    );
    let decl_a = out.find("local integer a").unwrap();
    let decl_b = out.find("local integer b").unwrap();
    let decl_c = out.find("local integer c").unwrap();
    let assign_a1 = out.find("set a = 1").unwrap();
    let assign_a2 = out.find("set a = a + 1").unwrap();
    let assign_b = out.find("set b = 2").unwrap();
    let assign_c = out.find("set c = a + b").unwrap();

    assert!(decl_a < decl_b && decl_b < decl_c, "all three locals declare at the top, in order");
    assert!(decl_c < assign_a1, "declarations precede every assignment");
    assert!(assign_a1 < assign_a2 && assign_a2 < assign_b && assign_b < assign_c, "assignments keep original order");
}

#[test]
fn s5_inconsistent_dedent_names_the_offending_line() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.jp");
    std::fs::write(&entry, "library Foo:\n    int x = 1\n  int y = 2\n").unwrap();

    let mut ctx = CompileContext::new(4);
    let err = compile_file(&entry, &mut ctx).unwrap_err();
    match &err {
        CompileError::Lexical { loc, .. } => assert_eq!(loc.span.line, 3),
        other => panic!("expected a lexical error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn s6_global_block_functions_are_public_sibling_function_is_private() {
    let out = compile(
        "library Foo:\n    global:\n        bar():\n            return\n        baz():\n            return\n    qux():\n        return\n",
    );
    assert!(out.contains("function bar"));
    assert!(!out.contains("private function bar"));
    assert!(out.contains("function baz"));
    assert!(!out.contains("private function baz"));
    assert!(out.contains("private function qux"));
}

#[test]
fn compile_and_write_round_trips_through_a_sibling_j_file() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("main.jp");
    std::fs::write(&entry, "library Foo:\n    int x = 1\n").unwrap();

    let out_path = compile_and_write(&entry, None, 4).unwrap();
    assert_eq!(out_path, entry.with_extension("j"));
    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("library Foo"));
}

#[test]
fn missing_entry_file_is_reported_as_io_error() {
    let mut ctx = CompileContext::new(4);
    let result = compile_file(Path::new("/definitely/not/a/real/path.jp"), &mut ctx);
    assert!(matches!(result, Err(CompileError::Io { .. })));
}
